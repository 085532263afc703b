//! Reliable Transport Protocol.
//!
//! One reliable message may be in flight per interface; it stays at the head
//! of the queue until every addressed neighbor has acknowledged it. Hellos,
//! Goodbyes and Acks are unreliable and bypass the wait. There are no
//! retransmissions: a lost Ack keeps the slot busy until the neighbor's hold
//! timer tears it down, which flushes its share.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use super::addr::AddressFamily;
use super::interface::InterfaceTable;
use super::message::{Header, HelloKind, MsgReq};
use super::neighbor::{Neighbor, NeighborId, NeighborTable};
use crate::net::IfaceId;

/// What the transport wants done with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtpAction {
    /// Hand a copy to the wire.
    Send(MsgReq),
    /// Never sent; drop it.
    Discard(MsgReq),
}

#[derive(Debug, Default, Clone)]
pub struct RequestQueue {
    reqs: VecDeque<MsgReq>,
}

impl RequestQueue {
    pub fn push(&mut self, req: MsgReq) {
        self.reqs.push_back(req);
    }

    pub fn len(&self) -> usize {
        self.reqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reqs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MsgReq> {
        self.reqs.iter()
    }

    /// Reliable requests already sent and still waiting for acks.
    pub fn in_flight(&self, iface: IfaceId) -> impl Iterator<Item = &MsgReq> {
        self.reqs
            .iter()
            .filter(move |r| r.dest_iface == iface && r.sent && r.num_of_ack > 0)
    }

    fn position(&self, pred: impl Fn(&MsgReq) -> bool) -> Option<usize> {
        self.reqs.iter().position(pred)
    }

    fn remove(&mut self, idx: usize) -> Option<MsgReq> {
        self.reqs.remove(idx)
    }

    fn drain_where(&mut self, pred: impl Fn(&MsgReq) -> bool) -> Vec<MsgReq> {
        let mut out = Vec::new();
        let mut keep = VecDeque::with_capacity(self.reqs.len());
        for r in self.reqs.drain(..) {
            if pred(&r) {
                out.push(r);
            } else {
                keep.push_back(r);
            }
        }
        self.reqs = keep;
        out
    }
}

#[derive(Debug, Clone)]
pub struct Rtp {
    queue: RequestQueue,
    next_seq: u32,
}

impl Default for Rtp {
    fn default() -> Self {
        Self {
            queue: RequestQueue::default(),
            next_seq: 1,
        }
    }
}

impl Rtp {
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    fn take_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1).max(1);
        seq
    }

    /// Accepts a request from the PDM and sends whatever the interface allows.
    pub fn process_request<A: AddressFamily>(
        &mut self,
        req: MsgReq,
        nt: &mut NeighborTable<A>,
        ift: &mut InterfaceTable<A>,
        out: &mut Vec<RtpAction>,
    ) {
        if let Some(dest) = req.dest_neighbor {
            if nt.get(dest).is_none() {
                debug!(opcode = %req.opcode, neighbor = %dest, "destination neighbor gone, request dropped");
                out.push(RtpAction::Discard(req));
                return;
            }
        }
        let iface = req.dest_iface;
        self.queue.push(req);
        self.schedule_next_msg(iface, nt, ift, out);
    }

    /// Ack and sequence handling for a received header. Returns true when the
    /// header acknowledged our outstanding message to this neighbor.
    pub fn process_header<A: AddressFamily>(
        &mut self,
        header: &Header,
        neighbor: NeighborId,
        iface: IfaceId,
        nt: &mut NeighborTable<A>,
        ift: &mut InterfaceTable<A>,
        out: &mut Vec<RtpAction>,
    ) -> bool {
        let acked = header.ack != 0 && self.acknowledge(neighbor, header.ack, nt, ift);

        if header.seq != 0 {
            if let Some(n) = nt.get_mut(neighbor) {
                n.seq_number = header.seq;
                let mut ack = MsgReq::hello(iface, HelloKind::Ack, Some(neighbor));
                ack.ack = header.seq;
                self.queue.push(ack);
            } else {
                trace!(seq = header.seq, "sequenced message from unknown neighbor, not acked");
            }
        }

        self.schedule_next_msg(iface, nt, ift, out);
        acked
    }

    fn acknowledge<A: AddressFamily>(
        &mut self,
        neighbor: NeighborId,
        ack: u32,
        nt: &mut NeighborTable<A>,
        ift: &mut InterfaceTable<A>,
    ) -> bool {
        let Some(n) = nt.get_mut(neighbor) else {
            return false;
        };
        if n.waiting_ack != ack {
            trace!(neighbor = %neighbor, ack, waiting = n.waiting_ack, "stale ack ignored");
            return false;
        }
        n.waiting_ack = 0;
        let iface = n.iface;

        let Some(idx) = self
            .queue
            .position(|r| r.sent && r.seq == ack && r.dest_iface == iface)
        else {
            return false;
        };
        let done = {
            let req = &mut self.queue.reqs[idx];
            req.num_of_ack = req.num_of_ack.saturating_sub(1);
            req.num_of_ack == 0
        };
        if done {
            self.queue.remove(idx);
            if let Some(eif) = ift.get_mut(iface) {
                eif.pending_msgs = eif.pending_msgs.saturating_sub(1);
            }
            trace!(%iface, seq = ack, "reliable message fully acknowledged");
        }
        true
    }

    /// Releases queued messages for an interface: every unreliable one, and
    /// the next reliable one if nothing is in flight.
    pub fn schedule_next_msg<A: AddressFamily>(
        &mut self,
        iface: IfaceId,
        nt: &mut NeighborTable<A>,
        ift: &mut InterfaceTable<A>,
        out: &mut Vec<RtpAction>,
    ) {
        if ift.enabled(iface).is_none() {
            self.interface_down(iface, ift, out);
            return;
        }

        while let Some(idx) = self
            .queue
            .position(|r| r.dest_iface == iface && !r.is_reliable())
        {
            let Some(req) = self.queue.remove(idx) else {
                break;
            };
            match req.dest_neighbor {
                Some(dest) if nt.get(dest).is_none() => out.push(RtpAction::Discard(req)),
                _ => out.push(RtpAction::Send(req)),
            }
        }

        loop {
            let pending = ift.enabled(iface).map_or(0, |i| i.pending_msgs);
            if pending > 0 {
                break;
            }
            let Some(idx) = self
                .queue
                .position(|r| r.dest_iface == iface && r.is_reliable() && !r.sent)
            else {
                break;
            };
            if self.send_reliable(idx, nt, ift, out) {
                break;
            }
        }
    }

    /// Returns true when the message now occupies the interface's slot.
    fn send_reliable<A: AddressFamily>(
        &mut self,
        idx: usize,
        nt: &mut NeighborTable<A>,
        ift: &mut InterfaceTable<A>,
        out: &mut Vec<RtpAction>,
    ) -> bool {
        if self.queue.reqs[idx].seq == 0 {
            let seq = self.take_seq();
            self.queue.reqs[idx].seq = seq;
        }
        let (seq, iface, dest) = {
            let r = &self.queue.reqs[idx];
            (r.seq, r.dest_iface, r.dest_neighbor)
        };

        let (ack, num_of_ack) = match dest {
            Some(nid) => {
                let Some(n) = nt.get_mut(nid) else {
                    // Neighbor vanished before its turn.
                    for r in self.queue.drain_where(|r| r.dest_neighbor == Some(nid) && !r.sent) {
                        out.push(RtpAction::Discard(r));
                    }
                    return false;
                };
                n.waiting_ack = seq;
                (n.seq_number, 1)
            }
            None => {
                let mut count = 0;
                for n in nt.on_iface_mut(iface) {
                    n.waiting_ack = seq;
                    count += 1;
                }
                (0, count)
            }
        };

        if num_of_ack == 0 {
            // Nobody on the segment can ack it; send without holding the slot.
            if let Some(mut req) = self.queue.remove(idx) {
                req.ack = ack;
                out.push(RtpAction::Send(req));
            }
            return false;
        }

        let req = &mut self.queue.reqs[idx];
        req.ack = ack;
        req.num_of_ack = num_of_ack;
        req.sent = true;
        if let Some(eif) = ift.get_mut(iface) {
            eif.pending_msgs += 1;
        }
        trace!(%iface, seq, num_of_ack, opcode = %req.opcode, "reliable message sent");
        out.push(RtpAction::Send(req.clone()));
        true
    }

    /// Flushes state tied to a neighbor that was just removed from the table.
    pub fn neighbor_removed<A: AddressFamily>(
        &mut self,
        neigh: &Neighbor<A>,
        nt: &mut NeighborTable<A>,
        ift: &mut InterfaceTable<A>,
        out: &mut Vec<RtpAction>,
    ) {
        let iface = neigh.iface;
        for r in self.queue.drain_where(|r| r.dest_neighbor == Some(neigh.id)) {
            if r.sent {
                if let Some(eif) = ift.get_mut(iface) {
                    eif.pending_msgs = eif.pending_msgs.saturating_sub(1);
                }
            } else {
                out.push(RtpAction::Discard(r));
            }
        }

        if neigh.waiting_ack != 0 {
            let seq = neigh.waiting_ack;
            if let Some(idx) = self
                .queue
                .position(|r| r.sent && r.is_multicast() && r.seq == seq && r.dest_iface == iface)
            {
                let done = {
                    let req = &mut self.queue.reqs[idx];
                    req.num_of_ack = req.num_of_ack.saturating_sub(1);
                    req.num_of_ack == 0
                };
                if done {
                    self.queue.remove(idx);
                    if let Some(eif) = ift.get_mut(iface) {
                        eif.pending_msgs = eif.pending_msgs.saturating_sub(1);
                    }
                }
            }
        }

        self.schedule_next_msg(iface, nt, ift, out);
    }

    /// Drops everything queued for an interface.
    pub fn interface_down<A: AddressFamily>(
        &mut self,
        iface: IfaceId,
        ift: &mut InterfaceTable<A>,
        out: &mut Vec<RtpAction>,
    ) {
        let dropped = self.queue.drain_where(|r| r.dest_iface == iface);
        if !dropped.is_empty() {
            warn!(%iface, count = dropped.len(), "interface gone, queued messages purged");
        }
        for r in dropped {
            if !r.sent {
                out.push(RtpAction::Discard(r));
            }
        }
        if let Some(eif) = ift.get_mut(iface) {
            eif.pending_msgs = 0;
        }
    }
}
