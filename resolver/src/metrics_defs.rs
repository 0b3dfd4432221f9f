//! Metrics definitions for the resolver.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of lookups answered from a fresh cache entry",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of lookups that started a new upstream resolution",
};

pub const CACHE_COALESCED: MetricDef = MetricDef {
    name: "cache.coalesced",
    metric_type: MetricType::Counter,
    description: "Number of lookups that waited on a resolution already in flight",
};

pub const UPSTREAM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "upstream.request.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of latest release requests to the upstream API in seconds",
};

pub const UPSTREAM_REQUEST_ERROR: MetricDef = MetricDef {
    name: "upstream.request.error",
    metric_type: MetricType::Counter,
    description: "Number of upstream resolutions that failed. Tagged with kind.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CACHE_HIT,
    CACHE_MISS,
    CACHE_COALESCED,
    UPSTREAM_REQUEST_DURATION,
    UPSTREAM_REQUEST_ERROR,
];
