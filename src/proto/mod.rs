//! 路由协议模块
//!
//! 目前包含 EIGRP（IPv4 / IPv6 两个地址族共用一份实现）。

pub mod eigrp;
