//! Discovery state machine
//!
//! A session is a chain of rounds: services, then for each service its
//! included services (optional), its characteristics, and the descriptors of
//! each characteristic. Nothing runs to completion synchronously. Every round
//! is started from the completion event of the previous one, so the engine
//! keeps its position on the peer as an explicit phase plus a cursor holding
//! the current service and the value handle of the last characteristic whose
//! descriptors were requested.

use super::types::{GattService, HandleRange};
use super::{DiscoveryEvent, GattDiscovery, SessionToken, STATUS_SUCCESS};
use crate::cache::PeerCache;
use crate::config::FailurePolicy;
use crate::error::{PeerError, PeerResult};
use crate::peer::lookup::PeerRef;
use crate::peer::registry::PeerNode;
use crate::peer::tree::{AttributeTree, CharacteristicNode, ServiceNode};
use crate::pool::{Linked, NodeId};
use crate::uuid::Uuid;
use log::{debug, info, trace, warn};

/// Completion callback of a discovery session, run exactly once
pub type DiscoveryCallback = Box<dyn FnOnce(PeerRef<'_>, PeerResult<()>) + Send>;

/// The round a session is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Services,
    Included,
    Characteristics,
    Descriptors(NodeId<CharacteristicNode>),
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Cursor {
    svc: Option<NodeId<ServiceNode>>,
    prev_chr_val: u16,
}

pub(crate) struct Session {
    token: SessionToken,
    filter: Option<Uuid>,
    phase: Phase,
    cursor: Cursor,
    callback: Option<DiscoveryCallback>,
}

/// Discovery progress of a peer, as seen by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryState {
    /// No session has run yet
    Idle,
    DiscoveringServices,
    /// Included services of the service starting at `service`
    DiscoveringIncluded { service: u16 },
    DiscoveringCharacteristics { service: u16 },
    /// Descriptors of the characteristic with value handle `characteristic`
    DiscoveringDescriptors { service: u16, characteristic: u16 },
    Done,
    Failed(PeerError),
}

impl DiscoveryState {
    pub(crate) fn of(tree: &AttributeTree, node: &PeerNode) -> Self {
        let Some(session) = &node.session else {
            return match &node.outcome {
                None => DiscoveryState::Idle,
                Some(Ok(())) => DiscoveryState::Done,
                Some(Err(err)) => DiscoveryState::Failed(err.clone()),
            };
        };

        let service = session
            .cursor
            .svc
            .and_then(|id| tree.service(id))
            .map_or(0, |svc| svc.svc.start_handle);

        match session.phase {
            Phase::Services => DiscoveryState::DiscoveringServices,
            Phase::Included => DiscoveryState::DiscoveringIncluded { service },
            Phase::Characteristics => DiscoveryState::DiscoveringCharacteristics { service },
            Phase::Descriptors(chr) => DiscoveryState::DiscoveringDescriptors {
                service,
                characteristic: tree.characteristic(chr).map_or(0, |c| c.chr.value_handle),
            },
        }
    }

    pub fn is_in_progress(&self) -> bool {
        !matches!(
            self,
            DiscoveryState::Idle | DiscoveryState::Done | DiscoveryState::Failed(_)
        )
    }
}

/// Descriptor range of a characteristic: after its value handle, up to the
/// next declaration or the end of the service
fn descriptor_range(value_handle: u16, next_declaration: Option<u16>, svc_end: u16) -> HandleRange {
    let end = match next_declaration {
        Some(decl) => decl.saturating_sub(1),
        None => svc_end,
    };
    match value_handle.checked_add(1) {
        Some(start) => HandleRange::new(start, end),
        None => HandleRange::new(1, 0),
    }
}

impl<D: GattDiscovery> PeerCache<D> {
    /// Discover every primary service of a connection, then the contents of
    /// each. `on_complete` runs once when the session ends, unless the peer is
    /// deleted first.
    ///
    /// Any tree left by an earlier session is released first. Fails with
    /// [`PeerError::Busy`] while another session is in flight; when the first
    /// request cannot be issued the error is returned here and `on_complete`
    /// is dropped without running.
    pub fn discover_all<F>(&mut self, conn_handle: u16, on_complete: F) -> PeerResult<()>
    where
        F: FnOnce(PeerRef<'_>, PeerResult<()>) + Send + 'static,
    {
        self.start_session(conn_handle, None, Box::new(on_complete))
    }

    /// Like [`discover_all`](Self::discover_all), restricted to the primary
    /// services matching `uuid`
    pub fn discover_by_uuid<F>(
        &mut self,
        conn_handle: u16,
        uuid: Uuid,
        on_complete: F,
    ) -> PeerResult<()>
    where
        F: FnOnce(PeerRef<'_>, PeerResult<()>) + Send + 'static,
    {
        self.start_session(conn_handle, Some(uuid), Box::new(on_complete))
    }

    fn start_session(
        &mut self,
        conn_handle: u16,
        filter: Option<Uuid>,
        callback: DiscoveryCallback,
    ) -> PeerResult<()> {
        let id = self
            .registry
            .lookup(conn_handle)
            .ok_or(PeerError::NotFound)?;
        if self.registry.peer(id).map_or(false, |p| p.session.is_some()) {
            return Err(PeerError::Busy(conn_handle));
        }

        let released = self.registry.clear_tree(id);
        if released.total() > 0 {
            debug!(
                "Released {} records of the previous discovery on 0x{:04X}",
                released.total(),
                conn_handle
            );
        }

        self.next_session = self.next_session.wrapping_add(1);
        let token = SessionToken::new(conn_handle, id, self.next_session);
        let peer = self.registry.peer_mut(id).ok_or(PeerError::NotFound)?;
        peer.outcome = None;
        peer.session = Some(Session {
            token,
            filter,
            phase: Phase::Services,
            cursor: Cursor::default(),
            callback: Some(callback),
        });

        if let Err(status) = self.request(id, Phase::Services, HandleRange::all()) {
            let err = PeerError::Protocol(status);
            if let Some(peer) = self.registry.peer_mut(id) {
                peer.session = None;
                peer.outcome = Some(Err(err.clone()));
            }
            warn!(
                "Could not start discovery on 0x{:04X}: status 0x{:04X}",
                conn_handle, status
            );
            return Err(err);
        }

        Ok(())
    }

    /// Feed one event from the discovery service into the state machine.
    ///
    /// Events for a session that is no longer live are ignored.
    pub fn handle_event(&mut self, token: SessionToken, event: DiscoveryEvent) {
        let Some((phase, cursor)) = self.live_session(token) else {
            debug!(
                "Ignoring {:?} for stale session {} on 0x{:04X}",
                event,
                token.session_id(),
                token.conn_handle()
            );
            return;
        };
        let peer_id = token.peer();
        trace!("0x{:04X} {:?}: {:?}", token.conn_handle(), phase, event);

        let linked = match (phase, event, cursor.svc) {
            (Phase::Services, DiscoveryEvent::Service(svc), _) => self.link_service(peer_id, svc),
            (Phase::Included, DiscoveryEvent::IncludedService(incl), Some(svc_id)) => self
                .registry
                .tree
                .add_included(svc_id, incl)
                .map(|_| ()),
            (Phase::Characteristics, DiscoveryEvent::Characteristic(chr), Some(svc_id)) => self
                .registry
                .tree
                .add_characteristic(svc_id, chr)
                .map(|_| ()),
            (Phase::Descriptors(chr_id), DiscoveryEvent::Descriptor(dsc), _) => self
                .registry
                .tree
                .add_descriptor(chr_id, dsc)
                .map(|_| ()),
            (phase, DiscoveryEvent::Complete(STATUS_SUCCESS), _) => {
                self.round_complete(peer_id, phase);
                Ok(())
            }
            (_, DiscoveryEvent::Complete(status), _) => Err(PeerError::Protocol(status)),
            (phase, event, _) => {
                warn!(
                    "Unexpected {:?} while waiting on {:?} for 0x{:04X}",
                    event,
                    phase,
                    token.conn_handle()
                );
                Ok(())
            }
        };

        if let Err(err) = linked {
            self.finish(peer_id, Err(err));
        }
    }

    fn live_session(&self, token: SessionToken) -> Option<(Phase, Cursor)> {
        let peer = self.registry.peer(token.peer())?;
        let session = peer.session.as_ref().filter(|s| s.token == token)?;
        Some((session.phase, session.cursor))
    }

    fn cursor(&self, peer_id: NodeId<PeerNode>) -> Option<Cursor> {
        self.registry.peer(peer_id)?.session.as_ref().map(|s| s.cursor)
    }

    fn session_mut(&mut self, peer_id: NodeId<PeerNode>) -> Option<&mut Session> {
        self.registry.peer_mut(peer_id)?.session.as_mut()
    }

    fn link_service(&mut self, peer_id: NodeId<PeerNode>, svc: GattService) -> PeerResult<()> {
        match self.registry.peer_and_tree(peer_id) {
            Some((peer, tree)) => tree.add_service(&mut peer.services, svc).map(|_| ()),
            None => Ok(()),
        }
    }

    fn round_complete(&mut self, peer_id: NodeId<PeerNode>, phase: Phase) {
        match phase {
            Phase::Services => {
                let first = self.registry.peer(peer_id).and_then(|p| p.services.head());
                self.enter_service(peer_id, first);
            }
            Phase::Included => self.discover_characteristics(peer_id),
            Phase::Characteristics | Phase::Descriptors(_) => self.next_descriptor_round(peer_id),
        }
    }

    /// Start on `next` or the first service after it with room for
    /// characteristics; complete the session when there is none.
    fn enter_service(&mut self, peer_id: NodeId<PeerNode>, mut next: Option<NodeId<ServiceNode>>) {
        while let Some(svc_id) = next {
            let Some(svc) = self.registry.tree.service(svc_id) else {
                break;
            };
            let range = svc.svc.range();
            next = svc.next();

            if range.start >= range.end {
                debug!("Skipping service {:?} without attributes", svc.svc.uuid);
                continue;
            }

            let Some(session) = self.session_mut(peer_id) else {
                return;
            };
            session.cursor = Cursor {
                svc: Some(svc_id),
                prev_chr_val: 0,
            };

            if self.config.discover_included {
                self.advance(peer_id, Phase::Included, range);
            } else {
                self.discover_characteristics(peer_id);
            }
            return;
        }

        self.finish(peer_id, Ok(()));
    }

    fn discover_characteristics(&mut self, peer_id: NodeId<PeerNode>) {
        let range = self
            .cursor(peer_id)
            .and_then(|cursor| cursor.svc)
            .and_then(|svc_id| self.registry.tree.service(svc_id))
            .map(|svc| svc.svc.range());

        match range {
            Some(range) => self.advance(peer_id, Phase::Characteristics, range),
            None => self.finish(peer_id, Err(PeerError::NotFound)),
        }
    }

    /// Request descriptors for the first characteristic of the current service
    /// past the cursor; move on to the next service when none is left.
    fn next_descriptor_round(&mut self, peer_id: NodeId<PeerNode>) {
        let Some(Cursor { svc: Some(svc_id), prev_chr_val }) = self.cursor(peer_id) else {
            self.finish(peer_id, Err(PeerError::NotFound));
            return;
        };
        let tree = &self.registry.tree;
        let Some(svc) = tree.service(svc_id) else {
            self.finish(peer_id, Err(PeerError::NotFound));
            return;
        };
        let next_svc = svc.next();

        let mut round = None;
        let mut chrs = tree.iter_characteristics(&svc.chrs).peekable();
        while let Some((chr_id, chr)) = chrs.next() {
            if chr.chr.value_handle <= prev_chr_val {
                continue;
            }
            let next_decl = chrs.peek().map(|(_, next)| next.chr.declaration_handle);
            let range = descriptor_range(chr.chr.value_handle, next_decl, svc.svc.end_handle);
            if range.is_empty() {
                trace!("No descriptor room after 0x{:04X}", chr.chr.value_handle);
                continue;
            }
            round = Some((chr_id, chr.chr.value_handle, range));
            break;
        }

        match round {
            Some((chr_id, value_handle, range)) => {
                if let Some(session) = self.session_mut(peer_id) {
                    session.cursor.prev_chr_val = value_handle;
                }
                self.advance(peer_id, Phase::Descriptors(chr_id), range);
            }
            None => self.enter_service(peer_id, next_svc),
        }
    }

    /// Start the next round, failing the session if it cannot be issued
    fn advance(&mut self, peer_id: NodeId<PeerNode>, phase: Phase, range: HandleRange) {
        if let Err(status) = self.request(peer_id, phase, range) {
            self.finish(peer_id, Err(PeerError::Protocol(status)));
        }
    }

    fn request(&mut self, peer_id: NodeId<PeerNode>, phase: Phase, range: HandleRange) -> Result<(), u16> {
        let Some(session) = self.session_mut(peer_id) else {
            return Ok(());
        };
        session.phase = phase;
        let (token, filter) = (session.token, session.filter);

        debug!(
            "0x{:04X}: requesting {:?} in {}",
            token.conn_handle(),
            phase,
            range
        );
        match (phase, filter) {
            (Phase::Services, None) => self.discovery.discover_services(token),
            (Phase::Services, Some(uuid)) => self.discovery.discover_services_by_uuid(&uuid, token),
            (Phase::Included, _) => self.discovery.discover_included_services(range, token),
            (Phase::Characteristics, _) => self.discovery.discover_characteristics(range, token),
            (Phase::Descriptors(_), _) => self.discovery.discover_descriptors(range, token),
        }
    }

    /// End the session and run its callback
    fn finish(&mut self, peer_id: NodeId<PeerNode>, result: PeerResult<()>) {
        let Some(mut session) = self
            .registry
            .peer_mut(peer_id)
            .and_then(|peer| peer.session.take())
        else {
            return;
        };
        let conn_handle = session.token.conn_handle();

        match &result {
            Ok(()) => info!("Discovery complete on 0x{:04X}", conn_handle),
            Err(err) => {
                warn!("Discovery failed on 0x{:04X}: {}", conn_handle, err);
                if self.config.failure_policy == FailurePolicy::DiscardPartial {
                    let released = self.registry.clear_tree(peer_id);
                    debug!("Discarded {} partial records", released.total());
                }
            }
        }

        if let Some(peer) = self.registry.peer_mut(peer_id) {
            peer.outcome = Some(result.clone());
        }
        if let (Some(callback), Some(peer)) =
            (session.callback.take(), self.registry.peer_ref(peer_id))
        {
            callback(peer, result);
        }
    }
}
