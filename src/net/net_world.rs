//! 网络世界实现
//!
//! 仿真器看到的业务状态：整个网络（路由器、链路、统计）。

use super::network::Network;
use crate::proto::eigrp::AddressFamily;
use crate::sim::World;
use std::any::Any;

/// 持有 Network 的仿真世界
#[derive(Default)]
pub struct NetWorld {
    pub net: Network,
}

impl NetWorld {
    /// 是否已收敛：没有待发送/待确认的报文，也没有处于 active 的路由
    pub fn is_converged<A: AddressFamily>(&self) -> bool {
        self.net.routers::<A>().all(|r| {
            let pdm = r.pdm();
            pdm.rtp().queue().is_empty() && pdm.topology().routes().all(|route| !route.is_active())
        })
    }
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
