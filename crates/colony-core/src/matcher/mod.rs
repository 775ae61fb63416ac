//! Supply/Demand - 供給と需要のマッチング
//!
//! Per zone, providers (storage, containers, ground drops) are matched to
//! consumers (spawns, extensions, towers, registered sinks, workers asking for
//! energy) with a greedy nearest-provider pass:
//!
//! 1. refresh both sides from live objects, minus what active transport tasks
//!    already cover
//! 2. sort consumers by `importance · needs / capacity`, descending
//! 3. for each consumer, take from the nearest provider (by path length) with
//!    stock left, decrementing scratch tallies, until its need is met
//!
//! One `TransportJob` is emitted per (provider, consumer) pairing. Scratch
//! tallies live only inside one pass.

pub mod in_flight;
pub mod ledger;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use self::in_flight::InFlight;
pub use self::ledger::{Consumer, ConsumerKind, Provider, ProviderKind, ZoneLedger};

use crate::config::MatcherConfig;
use crate::domain::{
    AgentName, AgentView, ObjectId, ObjectKind, Position, ResourceType, Tick, TransferEnd, ZoneId,
};
use crate::ports::{Movement, WorldQuery};
use crate::store::TaskStore;

/// Output of a pass; the generator turns each job into a Transport task.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportJob {
    pub from: TransferEnd,
    pub from_position: Position,
    pub to: TransferEnd,
    pub to_position: Position,
    pub resource: ResourceType,
    pub amount: u32,
    pub consumer: ConsumerKind,
}

/// A worker waiting for a delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyRequest {
    pub zone: ZoneId,
    pub resource: ResourceType,
    pub amount: u32,
    pub requested_at: Tick,
    pub deadline: Tick,
}

/// Handed back to the requesting worker: give up waiting after `deadline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyTicket {
    pub deadline: Tick,
}

/// Persistent part of the matcher. Ledgers are rebuilt every pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplySnapshot {
    #[serde(default)]
    pub providers: BTreeMap<ObjectId, ProviderKind>,
    #[serde(default)]
    pub consumers: BTreeMap<ObjectId, ConsumerKind>,
    #[serde(default)]
    pub requests: BTreeMap<AgentName, SupplyRequest>,
}

pub struct SupplyDemand {
    config: MatcherConfig,
    providers: BTreeMap<ObjectId, ProviderKind>,
    consumers: BTreeMap<ObjectId, ConsumerKind>,
    requests: BTreeMap<AgentName, SupplyRequest>,
    /// Ledgers of the last pass, used to estimate waits.
    ledgers: BTreeMap<ZoneId, ZoneLedger>,
}

impl SupplyDemand {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            providers: BTreeMap::new(),
            consumers: BTreeMap::new(),
            requests: BTreeMap::new(),
            ledgers: BTreeMap::new(),
        }
    }

    pub fn restore(snapshot: SupplySnapshot, config: MatcherConfig) -> Self {
        Self {
            providers: snapshot.providers,
            consumers: snapshot.consumers,
            requests: snapshot.requests,
            ..Self::new(config)
        }
    }

    pub fn snapshot(&self) -> SupplySnapshot {
        SupplySnapshot {
            providers: self.providers.clone(),
            consumers: self.consumers.clone(),
            requests: self.requests.clone(),
        }
    }

    /// Register a persistent provider (e.g. storage).
    pub fn register_provider(&mut self, id: ObjectId, kind: ProviderKind) {
        self.providers.insert(id, kind);
    }

    /// Register a static sink (e.g. a container next to the controller).
    pub fn register_consumer(&mut self, id: ObjectId, kind: ConsumerKind) {
        self.consumers.insert(id, kind);
    }

    pub fn pending_request(&self, agent: &AgentName) -> Option<&SupplyRequest> {
        self.requests.get(agent)
    }

    /// Ask for a delivery to `agent`. Repeated calls return the first ticket.
    ///
    /// The suggested wait is a round trip from the nearest provider plus a
    /// margin, clamped to the configured bounds.
    pub fn request(
        &mut self,
        agent: &AgentView,
        resource: ResourceType,
        amount: u32,
        movement: &dyn Movement,
        now: Tick,
    ) -> SupplyTicket {
        if let Some(existing) = self.requests.get(&agent.name) {
            return SupplyTicket {
                deadline: existing.deadline,
            };
        }

        let nearest = self
            .ledgers
            .get(&agent.position.zone)
            .into_iter()
            .flat_map(|ledger| ledger.providers.iter())
            .filter(|p| p.ready && p.amount > 0 && p.resource == resource)
            .filter_map(|p| movement.path_length(&p.position, &agent.position))
            .min();
        let wait = match nearest {
            Some(path) => (u64::from(path) * 2 + self.config.wait_margin_ticks)
                .clamp(self.config.wait_min_ticks, self.config.wait_max_ticks),
            None => self.config.wait_max_ticks,
        };
        let deadline = now.plus(wait);

        debug!(agent = %agent.name, amount, wait, "supply requested");
        self.requests.insert(
            agent.name.clone(),
            SupplyRequest {
                zone: agent.position.zone.clone(),
                resource,
                amount,
                requested_at: now,
                deadline,
            },
        );
        SupplyTicket { deadline }
    }

    /// Withdraw a request. Idempotent.
    pub fn cancel(&mut self, agent: &AgentName) {
        self.requests.remove(agent);
    }

    /// One matching pass over every zone.
    pub fn update(
        &mut self,
        world: &dyn WorldQuery,
        movement: &dyn Movement,
        store: &TaskStore,
        now: Tick,
    ) -> Vec<TransportJob> {
        self.collect_garbage(world, now);
        let in_flight = InFlight::from_store(store);

        let mut jobs = Vec::new();
        self.ledgers.clear();
        for zone in world.zones() {
            let ledger = self.scan_zone(world, &zone, &in_flight);
            jobs.extend(match_zone(&ledger, movement));
            self.ledgers.insert(zone, ledger);
        }
        jobs
    }

    fn collect_garbage(&mut self, world: &dyn WorldQuery, now: Tick) {
        self.providers.retain(|id, kind| {
            if !kind.is_persistent() {
                debug!(object = %id, kind = ?kind, "volatile provider registration dropped, rescanned instead");
                return false;
            }
            let alive = world.object(id).is_some();
            if !alive {
                warn!(object = %id, "registered provider vanished");
            }
            alive
        });
        self.consumers.retain(|id, _| {
            let alive = world.object(id).is_some();
            if !alive {
                warn!(object = %id, "registered consumer vanished");
            }
            alive
        });
        self.requests
            .retain(|agent, request| world.agent(agent).is_some() && request.deadline >= now);
    }

    fn scan_zone(&self, world: &dyn WorldQuery, zone: &ZoneId, in_flight: &InFlight) -> ZoneLedger {
        let mut ledger = ZoneLedger::default();

        // providers: registered storage + rescanned containers and drops
        let registered = self
            .providers
            .keys()
            .filter_map(|id| world.object(id))
            .filter(|obj| &obj.position.zone == zone);
        let scanned = world
            .find(zone, ObjectKind::Container)
            .into_iter()
            .chain(world.find(zone, ObjectKind::DroppedResource));
        for obj in registered.chain(scanned) {
            let Some(kind) = ProviderKind::from_object(obj.kind) else {
                continue;
            };
            if ledger.providers.iter().any(|p| p.id == obj.id) {
                continue;
            }
            for (&resource, &stored) in &obj.store {
                let amount = stored.saturating_sub(in_flight.outgoing(&obj.id, resource));
                let ready = match kind {
                    ProviderKind::Drop => stored >= self.config.min_drop_amount,
                    _ => amount > 0,
                };
                ledger.providers.push(Provider {
                    id: obj.id.clone(),
                    kind,
                    position: obj.position.clone(),
                    resource,
                    amount,
                    ready,
                });
            }
        }

        // consumers: production buildings, registered sinks, workers
        let resource = ResourceType::Energy;
        let buildings = [ObjectKind::Spawn, ObjectKind::Extension, ObjectKind::Tower]
            .into_iter()
            .flat_map(|kind| world.find(zone, kind))
            .filter_map(|obj| ConsumerKind::from_object(obj.kind).map(|kind| (kind, obj)));
        let sinks = self
            .consumers
            .iter()
            .filter_map(|(id, kind)| world.object(id).map(|obj| (*kind, obj)))
            .filter(|(_, obj)| &obj.position.zone == zone);
        for (kind, obj) in buildings.chain(sinks) {
            if ledger.consumers.iter().any(|c| c.id == obj.id) {
                continue;
            }
            let capacity = obj.store_capacity.unwrap_or(0);
            let needs = obj
                .free_capacity()
                .saturating_sub(in_flight.incoming(&obj.id, resource));
            if capacity == 0 || needs == 0 {
                continue;
            }
            ledger.consumers.push(Consumer {
                id: obj.id,
                kind,
                position: obj.position,
                resource,
                capacity,
                needs,
            });
        }
        for (name, request) in self.requests.iter().filter(|(_, r)| &r.zone == zone) {
            let Some(agent) = world.agent(name) else {
                continue;
            };
            let id = ObjectId::from(name);
            let wanted = request.amount.min(agent.free_capacity());
            let needs = wanted.saturating_sub(in_flight.incoming(&id, request.resource));
            if needs == 0 {
                continue;
            }
            ledger.consumers.push(Consumer {
                id,
                kind: ConsumerKind::Worker,
                position: agent.position,
                resource: request.resource,
                capacity: agent.carry_capacity.max(1),
                needs,
            });
        }

        ledger
    }
}

/// Greedy nearest-provider allocation for one zone.
pub fn match_zone(ledger: &ZoneLedger, movement: &dyn Movement) -> Vec<TransportJob> {
    let mut remaining: Vec<u32> = ledger
        .providers
        .iter()
        .map(|p| if p.ready { p.amount } else { 0 })
        .collect();

    let mut consumers: Vec<&Consumer> = ledger.consumers.iter().collect();
    consumers.sort_by(|a, b| {
        b.priority()
            .partial_cmp(&a.priority())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut jobs = Vec::new();
    for consumer in consumers {
        let mut reachable: Vec<(usize, u32)> = ledger
            .providers
            .iter()
            .enumerate()
            .filter(|(i, p)| remaining[*i] > 0 && consumer.accepts_from(p))
            .filter_map(|(i, p)| {
                movement
                    .path_length(&p.position, &consumer.position)
                    .map(|d| (i, d))
            })
            .collect();
        reachable.sort_by(|(ia, da), (ib, db)| {
            da.cmp(db)
                .then_with(|| ledger.providers[*ia].id.cmp(&ledger.providers[*ib].id))
        });

        let mut need = consumer.needs;
        for (index, _) in reachable {
            if need == 0 {
                break;
            }
            let take = need.min(remaining[index]);
            if take == 0 {
                continue;
            }
            remaining[index] -= take;
            need -= take;

            let provider = &ledger.providers[index];
            let to = match consumer.kind {
                ConsumerKind::Worker => TransferEnd::Agent(AgentName::new(consumer.id.as_str())),
                _ => TransferEnd::Object(consumer.id.clone()),
            };
            jobs.push(TransportJob {
                from: TransferEnd::Object(provider.id.clone()),
                from_position: provider.position.clone(),
                to,
                to_position: consumer.position.clone(),
                resource: consumer.resource,
                amount: take,
                consumer: consumer.kind,
            });
        }
    }
    jobs
}
