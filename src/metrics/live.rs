//! The tagged union over live instruments held by the registry.

use super::{Counter, Gauge, Histogram, Meter, Timer};
use crate::taxonomy::{MetricKind, Reading};
use std::sync::Arc;

/// A live instrument of one of the five metric kinds
#[derive(Debug, Clone)]
pub enum LiveMetric {
    Gauge(Arc<Gauge>),
    Counter(Arc<Counter>),
    Histogram(Arc<Histogram>),
    Meter(Arc<Meter>),
    Timer(Arc<Timer>),
}

impl LiveMetric {
    /// Fresh instrument of the given kind
    pub fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Gauge => LiveMetric::Gauge(Arc::new(Gauge::new())),
            MetricKind::Counter => LiveMetric::Counter(Arc::new(Counter::new())),
            MetricKind::Histogram => LiveMetric::Histogram(Arc::new(Histogram::new())),
            MetricKind::Meter => LiveMetric::Meter(Arc::new(Meter::new())),
            MetricKind::Timer => LiveMetric::Timer(Arc::new(Timer::new())),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            LiveMetric::Gauge(_) => MetricKind::Gauge,
            LiveMetric::Counter(_) => MetricKind::Counter,
            LiveMetric::Histogram(_) => MetricKind::Histogram,
            LiveMetric::Meter(_) => MetricKind::Meter,
            LiveMetric::Timer(_) => MetricKind::Timer,
        }
    }

    pub fn as_gauge(&self) -> Option<&Arc<Gauge>> {
        match self {
            LiveMetric::Gauge(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_counter(&self) -> Option<&Arc<Counter>> {
        match self {
            LiveMetric::Counter(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&Arc<Histogram>> {
        match self {
            LiveMetric::Histogram(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_meter(&self) -> Option<&Arc<Meter>> {
        match self {
            LiveMetric::Meter(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_timer(&self) -> Option<&Arc<Timer>> {
        match self {
            LiveMetric::Timer(t) => Some(t),
            _ => None,
        }
    }

    /// True if both variants point at the same instrument
    pub fn same_instance(&self, other: &LiveMetric) -> bool {
        match (self, other) {
            (LiveMetric::Gauge(a), LiveMetric::Gauge(b)) => Arc::ptr_eq(a, b),
            (LiveMetric::Counter(a), LiveMetric::Counter(b)) => Arc::ptr_eq(a, b),
            (LiveMetric::Histogram(a), LiveMetric::Histogram(b)) => Arc::ptr_eq(a, b),
            (LiveMetric::Meter(a), LiveMetric::Meter(b)) => Arc::ptr_eq(a, b),
            (LiveMetric::Timer(a), LiveMetric::Timer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Reads the instrument's current state once
    pub fn reading(&self) -> Reading {
        match self {
            LiveMetric::Gauge(g) => Reading {
                kind: MetricKind::Gauge,
                value: g.value(),
                count: 0,
                snapshot: None,
                rates: None,
            },
            LiveMetric::Counter(c) => {
                let count = c.count();
                Reading {
                    kind: MetricKind::Counter,
                    value: count as f64,
                    count: count.max(0) as u64,
                    snapshot: None,
                    rates: None,
                }
            },
            LiveMetric::Histogram(h) => Reading {
                kind: MetricKind::Histogram,
                value: 0.0,
                count: h.count(),
                snapshot: Some(h.snapshot()),
                rates: None,
            },
            LiveMetric::Meter(m) => Reading {
                kind: MetricKind::Meter,
                value: 0.0,
                count: m.count(),
                snapshot: None,
                rates: Some(m.rates()),
            },
            LiveMetric::Timer(t) => Reading {
                kind: MetricKind::Timer,
                value: 0.0,
                count: t.count(),
                snapshot: Some(t.snapshot()),
                rates: Some(t.rates()),
            },
        }
    }
}

impl From<Arc<Counter>> for LiveMetric {
    fn from(c: Arc<Counter>) -> Self {
        LiveMetric::Counter(c)
    }
}

impl From<Arc<Gauge>> for LiveMetric {
    fn from(g: Arc<Gauge>) -> Self {
        LiveMetric::Gauge(g)
    }
}

impl From<Arc<Histogram>> for LiveMetric {
    fn from(h: Arc<Histogram>) -> Self {
        LiveMetric::Histogram(h)
    }
}

impl From<Arc<Meter>> for LiveMetric {
    fn from(m: Arc<Meter>) -> Self {
        LiveMetric::Meter(m)
    }
}

impl From<Arc<Timer>> for LiveMetric {
    fn from(t: Arc<Timer>) -> Self {
        LiveMetric::Timer(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::BitFlag;

    #[test]
    fn test_new_matches_kind() {
        for kind in MetricKind::ALL {
            assert_eq!(LiveMetric::new(*kind).kind(), *kind);
        }
    }

    #[test]
    fn test_counter_reading() {
        let live = LiveMetric::new(MetricKind::Counter);
        live.as_counter().unwrap().inc_by(5);
        let reading = live.reading();
        assert_eq!(reading.count, 5);
        assert_eq!(reading.value, 5.0);
        assert!(reading.snapshot.is_none());
    }

    #[test]
    fn test_same_instance() {
        let a = LiveMetric::new(MetricKind::Gauge);
        let b = a.clone();
        let c = LiveMetric::new(MetricKind::Gauge);
        assert!(a.same_instance(&b));
        assert!(!a.same_instance(&c));
    }
}
