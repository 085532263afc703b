//! 数据包类型
//!
//! 路由器之间传递的报文：链路层 `Packet` 承载一个地址族无关的 `Payload`，
//! 其中是带源/目的地址的 EIGRP 报文（`Datagram`）。

use std::net::{Ipv4Addr, Ipv6Addr};

use super::id::{LinkId, NodeId};
use crate::proto::eigrp::Message;

/// 一份 EIGRP 报文及其 IP 源/目的地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram<A> {
    pub src: A,
    pub dst: A,
    pub msg: Message<A>,
}

/// 地址族无关的载荷
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    V4(Datagram<Ipv4Addr>),
    V6(Datagram<Ipv6Addr>),
}

impl Payload {
    /// 报文类别（Hello/Ack/Goodbye/Update/Query/Reply），用于统计
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::V4(d) => d.msg.kind(),
            Payload::V6(d) => d.msg.kind(),
        }
    }

    pub fn size_bytes(&self) -> u32 {
        match self {
            Payload::V4(d) => d.msg.size_bytes(),
            Payload::V6(d) => d.msg.size_bytes() + 20,
        }
    }
}

/// 链路上的一帧
#[derive(Debug, Clone)]
pub struct Packet {
    pub id: u64,
    /// 发送路由器
    pub from: NodeId,
    /// 承载链路
    pub link: LinkId,
    pub size_bytes: u32,
    pub payload: Payload,
}
