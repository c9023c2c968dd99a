//! Attribute tree storage
//!
//! Services, included services, characteristics and descriptors of every peer
//! live in four shared pools. A node's children are an index-linked list owned
//! by the node, so the tree of one peer is reachable only from that peer.

use crate::config::PoolCapacities;
use crate::discovery::types::{
    GattCharacteristic, GattDescriptor, GattIncludedService, GattService,
};
use crate::error::PeerResult;
use crate::pool::{Linked, ListIter, NodeId, NodeKind, NodeList, Pool, PoolStats};
use log::{trace, warn};

#[derive(Debug)]
pub(crate) struct ServiceNode {
    pub svc: GattService,
    pub included: NodeList<IncludedNode>,
    pub chrs: NodeList<CharacteristicNode>,
    next: Option<NodeId<ServiceNode>>,
}

#[derive(Debug)]
pub(crate) struct IncludedNode {
    pub incl: GattIncludedService,
    next: Option<NodeId<IncludedNode>>,
}

#[derive(Debug)]
pub(crate) struct CharacteristicNode {
    pub chr: GattCharacteristic,
    pub dscs: NodeList<DescriptorNode>,
    next: Option<NodeId<CharacteristicNode>>,
}

#[derive(Debug)]
pub(crate) struct DescriptorNode {
    pub dsc: GattDescriptor,
    next: Option<NodeId<DescriptorNode>>,
}

macro_rules! impl_linked {
    ($($node:ty),*) => {
        $(
            impl Linked for $node {
                fn next(&self) -> Option<NodeId<Self>> {
                    self.next
                }

                fn set_next(&mut self, next: Option<NodeId<Self>>) {
                    self.next = next;
                }
            }
        )*
    };
}

impl_linked!(ServiceNode, IncludedNode, CharacteristicNode, DescriptorNode);

/// Nodes released by a teardown, by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Released {
    pub services: usize,
    pub included_services: usize,
    pub characteristics: usize,
    pub descriptors: usize,
}

impl Released {
    pub fn total(&self) -> usize {
        self.services + self.included_services + self.characteristics + self.descriptors
    }
}

/// Handle of the last node of `list`, if any
fn tail_handle<T: Linked>(
    pool: &Pool<T>,
    list: &NodeList<T>,
    handle_of: impl Fn(&T) -> u16,
) -> Option<u16> {
    list.tail().and_then(|id| pool.get(id)).map(handle_of)
}

pub(crate) struct AttributeTree {
    services: Pool<ServiceNode>,
    included: Pool<IncludedNode>,
    characteristics: Pool<CharacteristicNode>,
    descriptors: Pool<DescriptorNode>,
}

impl AttributeTree {
    pub fn new(capacities: &PoolCapacities) -> Self {
        Self {
            services: Pool::with_capacity(NodeKind::Service, capacities.max_services),
            included: Pool::with_capacity(
                NodeKind::IncludedService,
                capacities.max_included_services,
            ),
            characteristics: Pool::with_capacity(
                NodeKind::Characteristic,
                capacities.max_characteristics,
            ),
            descriptors: Pool::with_capacity(NodeKind::Descriptor, capacities.max_descriptors),
        }
    }

    /// Append a service to a peer's service list.
    ///
    /// Returns `Ok(None)` when the service does not follow the current tail in
    /// handle order; such reports are dropped.
    pub fn add_service(
        &mut self,
        list: &mut NodeList<ServiceNode>,
        svc: GattService,
    ) -> PeerResult<Option<NodeId<ServiceNode>>> {
        if let Some(last) = tail_handle(&self.services, list, |n| n.svc.start_handle) {
            if svc.start_handle <= last {
                warn!(
                    "Ignoring service {:?} at 0x{:04X}: not after 0x{:04X}",
                    svc.uuid, svc.start_handle, last
                );
                return Ok(None);
            }
        }

        trace!("Service {:?} {}", svc.uuid, svc.range());
        let node = ServiceNode {
            svc,
            included: NodeList::new(),
            chrs: NodeList::new(),
            next: None,
        };
        self.services.push_back(list, node).map(Some)
    }

    pub fn add_included(
        &mut self,
        svc_id: NodeId<ServiceNode>,
        incl: GattIncludedService,
    ) -> PeerResult<Option<NodeId<IncludedNode>>> {
        let Some(svc) = self.services.get_mut(svc_id) else {
            return Ok(None);
        };
        if !svc.svc.range().contains(incl.handle) {
            warn!(
                "Ignoring include at 0x{:04X}: outside service {}",
                incl.handle,
                svc.svc.range()
            );
            return Ok(None);
        }
        if let Some(last) = tail_handle(&self.included, &svc.included, |n| n.incl.handle) {
            if incl.handle <= last {
                warn!("Ignoring include at 0x{:04X}: not after 0x{:04X}", incl.handle, last);
                return Ok(None);
            }
        }

        trace!("Included service {:?} at 0x{:04X}", incl.uuid, incl.handle);
        let node = IncludedNode { incl, next: None };
        self.included.push_back(&mut svc.included, node).map(Some)
    }

    pub fn add_characteristic(
        &mut self,
        svc_id: NodeId<ServiceNode>,
        chr: GattCharacteristic,
    ) -> PeerResult<Option<NodeId<CharacteristicNode>>> {
        let Some(svc) = self.services.get_mut(svc_id) else {
            return Ok(None);
        };
        if !svc.svc.range().contains(chr.declaration_handle) {
            warn!(
                "Ignoring characteristic at 0x{:04X}: outside service {}",
                chr.declaration_handle,
                svc.svc.range()
            );
            return Ok(None);
        }
        if let Some(last) = tail_handle(&self.characteristics, &svc.chrs, |n| {
            n.chr.declaration_handle
        }) {
            if chr.declaration_handle <= last {
                warn!(
                    "Ignoring characteristic at 0x{:04X}: not after 0x{:04X}",
                    chr.declaration_handle, last
                );
                return Ok(None);
            }
        }

        trace!(
            "Characteristic {:?} decl 0x{:04X} value 0x{:04X}",
            chr.uuid,
            chr.declaration_handle,
            chr.value_handle
        );
        let node = CharacteristicNode {
            chr,
            dscs: NodeList::new(),
            next: None,
        };
        self.characteristics.push_back(&mut svc.chrs, node).map(Some)
    }

    pub fn add_descriptor(
        &mut self,
        chr_id: NodeId<CharacteristicNode>,
        dsc: GattDescriptor,
    ) -> PeerResult<Option<NodeId<DescriptorNode>>> {
        let Some(chr) = self.characteristics.get_mut(chr_id) else {
            return Ok(None);
        };
        let floor = tail_handle(&self.descriptors, &chr.dscs, |n| n.dsc.handle)
            .unwrap_or(chr.chr.value_handle);
        if dsc.handle <= floor {
            warn!("Ignoring descriptor at 0x{:04X}: not after 0x{:04X}", dsc.handle, floor);
            return Ok(None);
        }

        trace!("Descriptor {:?} at 0x{:04X}", dsc.uuid, dsc.handle);
        let node = DescriptorNode { dsc, next: None };
        self.descriptors.push_back(&mut chr.dscs, node).map(Some)
    }

    /// Release every service in `list` together with everything it owns.
    ///
    /// Children are released before their parent; the walk follows the sibling
    /// links so the depth of the tree never turns into recursion.
    pub fn release_services(&mut self, list: &mut NodeList<ServiceNode>) -> Released {
        let mut released = Released::default();
        if list.is_empty() {
            return released;
        }
        let mut next_svc = list.head();
        *list = NodeList::new();

        while let Some(svc_id) = next_svc {
            let Some(svc) = self.services.get(svc_id) else {
                break;
            };
            let (chrs, included) = (svc.chrs, svc.included);
            next_svc = svc.next;

            let mut next_chr = chrs.head();
            while let Some(chr_id) = next_chr {
                let Some(chr) = self.characteristics.get(chr_id) else {
                    break;
                };
                let dscs = chr.dscs;
                next_chr = chr.next;

                let mut next_dsc = dscs.head();
                while let Some(dsc_id) = next_dsc {
                    next_dsc = self.descriptors.release(dsc_id).and_then(|dsc| dsc.next);
                    released.descriptors += 1;
                }

                self.characteristics.release(chr_id);
                released.characteristics += 1;
            }

            let mut next_incl = included.head();
            while let Some(incl_id) = next_incl {
                next_incl = self.included.release(incl_id).and_then(|incl| incl.next);
                released.included_services += 1;
            }

            self.services.release(svc_id);
            released.services += 1;
        }

        released
    }

    pub fn service(&self, id: NodeId<ServiceNode>) -> Option<&ServiceNode> {
        self.services.get(id)
    }

    pub fn characteristic(&self, id: NodeId<CharacteristicNode>) -> Option<&CharacteristicNode> {
        self.characteristics.get(id)
    }

    pub fn iter_services<'a>(&'a self, list: &NodeList<ServiceNode>) -> ListIter<'a, ServiceNode> {
        self.services.iter(list)
    }

    pub fn iter_included<'a>(
        &'a self,
        list: &NodeList<IncludedNode>,
    ) -> ListIter<'a, IncludedNode> {
        self.included.iter(list)
    }

    pub fn iter_characteristics<'a>(
        &'a self,
        list: &NodeList<CharacteristicNode>,
    ) -> ListIter<'a, CharacteristicNode> {
        self.characteristics.iter(list)
    }

    pub fn iter_descriptors<'a>(
        &'a self,
        list: &NodeList<DescriptorNode>,
    ) -> ListIter<'a, DescriptorNode> {
        self.descriptors.iter(list)
    }

    pub fn stats(&self) -> [PoolStats; 4] {
        [
            self.services.stats(),
            self.included.stats(),
            self.characteristics.stats(),
            self.descriptors.stats(),
        ]
    }
}
