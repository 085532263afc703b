//! Classic composite metric.
//!
//! Pure functions over the metric-parameter vector carried in route TLVs:
//! computing the scalar distance, composing a neighbor's vector with a local
//! interface, and deciding whether two vectors differ in a way the K-values
//! care about.

use serde::{Deserialize, Serialize};

/// Delay sentinel meaning "unreachable" (tens of microseconds).
pub const DELAY_INF: u32 = u32::MAX;
/// Bandwidth sentinel paired with [`DELAY_INF`] in unreachable TLVs (Kbit/s).
pub const BANDWIDTH_INF: u32 = u32::MAX;
/// Infinite distance.
pub const METRIC_INF: u64 = 0x00FF_FFFF_FFFF_FFFF;

const CLASSIC_SCALE: u64 = 256;
const BANDWIDTH_REFERENCE_KBPS: u64 = 10_000_000;

/// The vector advertised per route and stored per path.
///
/// `bandwidth` is the minimum bandwidth along the path in Kbit/s and `delay`
/// the cumulative delay in tens of microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricParams {
    pub bandwidth: u32,
    pub delay: u32,
    pub reliability: u8,
    pub load: u8,
    pub mtu: u32,
    pub hop_count: u8,
}

impl MetricParams {
    pub const fn unreachable() -> Self {
        Self {
            bandwidth: BANDWIDTH_INF,
            delay: DELAY_INF,
            reliability: 0,
            load: 0,
            mtu: 0,
            hop_count: 0,
        }
    }

    /// Parameters of a directly attached interface (hop count 0).
    pub fn interface(bandwidth: u32, delay: u32, reliability: u8, load: u8, mtu: u32) -> Self {
        Self {
            bandwidth,
            delay,
            reliability,
            load,
            mtu,
            hop_count: 0,
        }
    }

    pub fn is_maximal(&self) -> bool {
        self.delay == DELAY_INF
    }

    pub fn set_unreachable(&mut self) {
        self.delay = DELAY_INF;
        self.bandwidth = BANDWIDTH_INF;
    }
}

impl Default for MetricParams {
    fn default() -> Self {
        Self::unreachable()
    }
}

/// Metric weights. All 255 is the Goodbye marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KValues {
    pub k1: u8,
    pub k2: u8,
    pub k3: u8,
    pub k4: u8,
    pub k5: u8,
    pub k6: u8,
}

impl KValues {
    pub const GOODBYE: KValues = KValues {
        k1: 255,
        k2: 255,
        k3: 255,
        k4: 255,
        k5: 255,
        k6: 255,
    };

    pub fn from_array(k: [u8; 6]) -> Self {
        Self {
            k1: k[0],
            k2: k[1],
            k3: k[2],
            k4: k[3],
            k5: k[4],
            k6: k[5],
        }
    }

    pub fn is_goodbye(&self) -> bool {
        *self == Self::GOODBYE
    }
}

impl Default for KValues {
    fn default() -> Self {
        Self::from_array([1, 0, 1, 0, 0, 0])
    }
}

/// Scalar distance for a parameter vector.
pub fn compute_classic_metric(params: &MetricParams, k: &KValues) -> u64 {
    if params.is_maximal() || params.bandwidth == 0 {
        return METRIC_INF;
    }

    let bw = BANDWIDTH_REFERENCE_KBPS / u64::from(params.bandwidth);
    let delay = u64::from(params.delay);
    let load_div = 256 - u64::from(params.load);

    let mut metric = u64::from(k.k1)
        .saturating_mul(bw)
        .saturating_add(u64::from(k.k2).saturating_mul(bw) / load_div)
        .saturating_add(u64::from(k.k3).saturating_mul(delay))
        .saturating_mul(CLASSIC_SCALE);

    // Scaled first so the reliability ratio does not truncate to zero.
    if k.k5 != 0 {
        let denom = (u64::from(params.reliability) + u64::from(k.k4)).max(1);
        metric = metric.saturating_mul(u64::from(k.k5)) / denom;
    }

    metric.min(METRIC_INF - 1)
}

/// Composes the vector a neighbor reported with the receiving interface.
pub fn adjust_param(iface: &MetricParams, neigh: &MetricParams) -> MetricParams {
    let mut out = MetricParams {
        bandwidth: iface.bandwidth.min(neigh.bandwidth),
        delay: 0,
        reliability: iface.reliability.min(neigh.reliability),
        load: iface.load.max(neigh.load),
        mtu: iface.mtu.min(neigh.mtu),
        hop_count: neigh.hop_count.saturating_add(1),
    };

    if neigh.is_maximal() || iface.is_maximal() {
        out.set_unreachable();
    } else {
        out.delay = iface.delay.saturating_add(neigh.delay).min(DELAY_INF - 1);
    }
    out
}

/// True when the two vectors are equal in every field some non-zero K-value uses.
pub fn compare_parameters(a: &MetricParams, b: &MetricParams, k: &KValues) -> bool {
    if a.is_maximal() != b.is_maximal() {
        return false;
    }
    if (k.k1 != 0 || k.k2 != 0) && a.bandwidth != b.bandwidth {
        return false;
    }
    if k.k2 != 0 && a.load != b.load {
        return false;
    }
    if k.k3 != 0 && a.delay != b.delay {
        return false;
    }
    if k.k5 != 0 && a.reliability != b.reliability {
        return false;
    }
    true
}
