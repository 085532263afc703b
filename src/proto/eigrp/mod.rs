//! EIGRP routing process.
//!
//! Layered the way a router runs it:
//!
//! - [`metric`]: composite metric from bandwidth/delay/reliability/load and K-values.
//! - [`topology`]: every known path per destination, successor selection and
//!   feasibility checks.
//! - [`dual`]: the diffusing update state machine that keeps routes loop-free
//!   while they are being recomputed.
//! - [`rtp`]: reliable, ordered delivery of updates/queries/replies over
//!   unreliable links.
//! - [`pdm`]: glue for one address family: neighbor discovery, message
//!   processing, split horizon, stubs and the host routing table.

pub mod addr;
pub mod config;
pub mod dual;
pub mod interface;
pub mod message;
pub mod metric;
pub mod neighbor;
pub mod pdm;
pub mod rtp;
pub mod timer;
pub mod topology;

pub use addr::{AddressFamily, Prefix, RouterId, parse_prefix};
pub use config::{ConfigError, InterfaceConfig, ProcessConfig};
pub use dual::{Dual, DualEvent, DualPdm, ReplyStatus};
pub use interface::{EigrpInterface, InterfaceTable};
pub use message::{Body, Header, Message, Opcode, RouteTlv, StubFlags};
pub use metric::{KValues, METRIC_INF, MetricParams};
pub use neighbor::{Neighbor, NeighborId, NeighborTable};
pub use pdm::{Outbound, Pdm};
pub use rtp::Rtp;
pub use timer::{EigrpTimer, TimerScheduler};
pub use topology::{QueryOrigin, Route, RouteId, RouteSource, SourceId, TopologyTable};
