//! Read-only views over a peer's attribute tree
//!
//! Every lookup is a linear scan in discovery order and the first match wins.
//! Nothing here allocates or mutates.

use super::registry::PeerNode;
use super::tree::{AttributeTree, CharacteristicNode, ServiceNode};
use crate::addr::BdAddr;
use crate::discovery::engine::DiscoveryState;
use crate::discovery::types::{
    GattCharacteristic, GattDescriptor, GattIncludedService, GattService,
};
use crate::uuid::Uuid;
use log::info;
use std::fmt;
use std::ops::Deref;

/// A registered peer
#[derive(Clone, Copy)]
pub struct PeerRef<'a> {
    tree: &'a AttributeTree,
    node: &'a PeerNode,
}

impl<'a> PeerRef<'a> {
    pub(crate) fn new(tree: &'a AttributeTree, node: &'a PeerNode) -> Self {
        Self { tree, node }
    }

    pub fn conn_handle(&self) -> u16 {
        self.node.conn_handle
    }

    pub fn addr(&self) -> BdAddr {
        self.node.addr
    }

    /// Negotiated ATT MTU, 0 until one has been reported
    pub fn mtu(&self) -> u16 {
        self.node.mtu
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        DiscoveryState::of(self.tree, self.node)
    }

    /// Services in discovery order
    pub fn services(&self) -> impl Iterator<Item = ServiceRef<'a>> + 'a {
        let tree = self.tree;
        tree.iter_services(&self.node.services)
            .map(move |(_, node)| ServiceRef { tree, node })
    }

    pub fn service_count(&self) -> usize {
        self.node.services.len()
    }

    pub fn find_service(&self, uuid: &Uuid) -> Option<ServiceRef<'a>> {
        self.services().find(|svc| svc.uuid == *uuid)
    }

    /// Search the first service matching `svc_uuid` for `chr_uuid`
    pub fn find_characteristic(
        &self,
        svc_uuid: &Uuid,
        chr_uuid: &Uuid,
    ) -> Option<CharacteristicRef<'a>> {
        self.find_service(svc_uuid)?.find_characteristic(chr_uuid)
    }

    pub fn find_descriptor(
        &self,
        svc_uuid: &Uuid,
        chr_uuid: &Uuid,
        dsc_uuid: &Uuid,
    ) -> Option<&'a GattDescriptor> {
        self.find_characteristic(svc_uuid, chr_uuid)?
            .find_descriptor(dsc_uuid)
    }

    /// Write the whole tree to the log
    pub fn log_tree(&self) {
        info!(
            "Peer 0x{:04X} addr {} mtu {}: {} services",
            self.conn_handle(),
            self.addr(),
            self.mtu(),
            self.service_count()
        );
        for svc in self.services() {
            info!("  service {:?} {}", svc.uuid, svc.range());
            for incl in svc.included_services() {
                info!(
                    "    include {:?} 0x{:04X}..=0x{:04X}",
                    incl.uuid, incl.start_handle, incl.end_handle
                );
            }
            for chr in svc.characteristics() {
                info!(
                    "    characteristic {:?} value 0x{:04X} props {:?}",
                    chr.uuid, chr.value_handle, chr.properties
                );
                for dsc in chr.descriptors() {
                    info!("      descriptor {:?} 0x{:04X}", dsc.uuid, dsc.handle);
                }
            }
        }
    }
}

impl fmt::Debug for PeerRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerRef")
            .field("conn_handle", &self.conn_handle())
            .field("addr", &self.addr())
            .field("mtu", &self.mtu())
            .field("services", &self.service_count())
            .finish()
    }
}

/// A discovered service and what it owns
#[derive(Clone, Copy)]
pub struct ServiceRef<'a> {
    tree: &'a AttributeTree,
    node: &'a ServiceNode,
}

impl<'a> ServiceRef<'a> {
    pub fn characteristics(&self) -> impl Iterator<Item = CharacteristicRef<'a>> + 'a {
        let tree = self.tree;
        tree.iter_characteristics(&self.node.chrs)
            .map(move |(_, node)| CharacteristicRef { node, tree })
    }

    pub fn included_services(&self) -> impl Iterator<Item = &'a GattIncludedService> + 'a {
        self.tree
            .iter_included(&self.node.included)
            .map(|(_, node)| &node.incl)
    }

    pub fn find_characteristic(&self, uuid: &Uuid) -> Option<CharacteristicRef<'a>> {
        self.characteristics().find(|chr| chr.uuid == *uuid)
    }

    pub fn characteristic_by_value_handle(&self, value_handle: u16) -> Option<CharacteristicRef<'a>> {
        self.characteristics()
            .find(|chr| chr.value_handle == value_handle)
    }
}

impl Deref for ServiceRef<'_> {
    type Target = GattService;

    fn deref(&self) -> &GattService {
        &self.node.svc
    }
}

impl fmt::Debug for ServiceRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.node.svc, f)
    }
}

/// A discovered characteristic and its descriptors
#[derive(Clone, Copy)]
pub struct CharacteristicRef<'a> {
    tree: &'a AttributeTree,
    node: &'a CharacteristicNode,
}

impl<'a> CharacteristicRef<'a> {
    pub fn descriptors(&self) -> impl Iterator<Item = &'a GattDescriptor> + 'a {
        self.tree
            .iter_descriptors(&self.node.dscs)
            .map(|(_, node)| &node.dsc)
    }

    pub fn find_descriptor(&self, uuid: &Uuid) -> Option<&'a GattDescriptor> {
        self.descriptors().find(|dsc| dsc.uuid == *uuid)
    }
}

impl Deref for CharacteristicRef<'_> {
    type Target = GattCharacteristic;

    fn deref(&self) -> &GattCharacteristic {
        &self.node.chr
    }
}

impl fmt::Debug for CharacteristicRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.node.chr, f)
    }
}
