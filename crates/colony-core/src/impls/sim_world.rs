//! SimWorld - 開発用・テスト用の決定的なワールド
//!
//! `WorldQuery` / `Movement` / `Actuator` をすべて 1 つの構造体で実装する。
//! 経路探索はしない（Chebyshev 距離で 1 マスずつ寄る。壁だけは避ける）。
//!
//! # 学習ポイント
//! - port の trait は `&self` なので内部状態は `RefCell` に置く
//! - 1 tick 内の順序は呼び出し順そのもの（乱数なし → 同じ入力なら同じ結果）

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{
    AgentName, AgentView, Cargo, Loadout, Meter, ObjectId, ObjectKind, ObjectView, Position,
    ResourceType, Tick, ZoneId, cargo_total,
};
use crate::ports::{ActionResult, Actuator, MoveOutcome, Movement, TransferTarget, WorldQuery};

const CARRY_PER_PART: u32 = 50;
const HARVEST_PER_WORK: u32 = 2;
const BUILD_PER_WORK: u32 = 5;
const REPAIR_PER_WORK: u32 = 100;
const UPGRADE_PER_WORK: u32 = 1;
const ATTACK_PER_PART: u32 = 30;
const STRUCTURE_HITS: u32 = 5000;
const CONTROLLER_DOWNGRADE: u32 = 20_000;
const CONTROLLER_PROGRESS: u32 = 10_000;

/// Range of harvest / withdraw / pickup / transfer / attack.
const ADJACENT: u32 = 1;
/// Range of build / upgrade / repair.
const WORK_RANGE: u32 = 3;

#[derive(Debug, Clone)]
struct SimAgent {
    position: Position,
    loadout: Loadout,
    carry: Cargo,
    ticks_to_live: u32,
}

impl SimAgent {
    fn capacity(&self) -> u32 {
        self.loadout.carry * CARRY_PER_PART
    }

    fn free(&self) -> u32 {
        self.capacity().saturating_sub(cargo_total(&self.carry))
    }

    fn carried(&self, resource: ResourceType) -> u32 {
        self.carry.get(&resource).copied().unwrap_or(0)
    }

    fn view(&self, name: &AgentName) -> AgentView {
        AgentView {
            name: name.clone(),
            position: self.position.clone(),
            loadout: self.loadout,
            carry: self.carry.clone(),
            carry_capacity: self.capacity(),
            ticks_to_live: self.ticks_to_live,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    tick: Tick,
    agents: BTreeMap<AgentName, SimAgent>,
    objects: BTreeMap<ObjectId, ObjectView>,
    walls: BTreeSet<Position>,
    no_drop: BTreeSet<Position>,
    next_drop: u64,
}

impl SimState {
    /// Put `amount` of `resource` on the ground, merging into an existing pile.
    fn drop_at(&mut self, position: &Position, resource: ResourceType, amount: u32) {
        if amount == 0 {
            return;
        }
        let existing = self
            .objects
            .values_mut()
            .find(|obj| obj.kind == ObjectKind::DroppedResource && &obj.position == position);
        if let Some(pile) = existing {
            put(&mut pile.store, resource, amount);
            return;
        }
        self.next_drop += 1;
        let id = ObjectId::new(format!("drop-{}", self.next_drop));
        let mut pile = object(id.clone(), ObjectKind::DroppedResource, position.clone());
        put(&mut pile.store, resource, amount);
        self.objects.insert(id, pile);
    }
}

fn object(id: ObjectId, kind: ObjectKind, position: Position) -> ObjectView {
    ObjectView {
        id,
        kind,
        position,
        store: Cargo::new(),
        store_capacity: None,
        progress: None,
        hits: None,
        downgrade_in: None,
    }
}

fn put(cargo: &mut Cargo, resource: ResourceType, amount: u32) {
    if amount > 0 {
        *cargo.entry(resource).or_insert(0) += amount;
    }
}

/// Remove up to `amount`; returns what was actually taken.
fn take(cargo: &mut Cargo, resource: ResourceType, amount: u32) -> u32 {
    let Some(held) = cargo.get_mut(&resource) else {
        return 0;
    };
    let taken = amount.min(*held);
    *held -= taken;
    if *held == 0 {
        cargo.remove(&resource);
    }
    taken
}

/// Deterministic in-process world.
#[derive(Debug, Default)]
pub struct SimWorld {
    state: RefCell<SimState>,
}

impl SimWorld {
    pub fn new(tick: Tick) -> Self {
        Self {
            state: RefCell::new(SimState {
                tick,
                ..SimState::default()
            }),
        }
    }

    /// Advance one tick: age agents (removing the dead) and count down controllers.
    pub fn advance(&self) {
        let mut state = self.state.borrow_mut();
        state.tick = state.tick.plus(1);
        for agent in state.agents.values_mut() {
            agent.ticks_to_live = agent.ticks_to_live.saturating_sub(1);
        }
        state.agents.retain(|_, agent| agent.ticks_to_live > 0);
        for obj in state.objects.values_mut() {
            if let Some(ticks) = obj.downgrade_in.as_mut() {
                *ticks = ticks.saturating_sub(1);
            }
        }
    }

    pub fn add_agent(&self, name: impl Into<String>, position: Position, loadout: Loadout, ticks_to_live: u32) {
        self.state.borrow_mut().agents.insert(
            AgentName::new(name),
            SimAgent {
                position,
                loadout,
                carry: Cargo::new(),
                ticks_to_live,
            },
        );
    }

    pub fn remove_agent(&self, name: &AgentName) {
        self.state.borrow_mut().agents.remove(name);
    }

    pub fn set_carry(&self, name: &AgentName, resource: ResourceType, amount: u32) {
        if let Some(agent) = self.state.borrow_mut().agents.get_mut(name) {
            agent.carry.remove(&resource);
            put(&mut agent.carry, resource, amount);
        }
    }

    fn insert_object(&self, obj: ObjectView) {
        self.state.borrow_mut().objects.insert(obj.id.clone(), obj);
    }

    pub fn add_source(&self, id: impl Into<String>, position: Position, energy: u32) {
        let mut obj = object(ObjectId::new(id), ObjectKind::Source, position);
        obj.store.insert(ResourceType::Energy, energy);
        self.insert_object(obj);
    }

    /// A structure with an energy store (spawn, extension, tower, container, storage).
    pub fn add_store(
        &self,
        id: impl Into<String>,
        kind: ObjectKind,
        position: Position,
        energy: u32,
        capacity: u32,
    ) {
        let mut obj = object(ObjectId::new(id), kind, position);
        put(&mut obj.store, ResourceType::Energy, energy);
        obj.store_capacity = Some(capacity);
        obj.hits = Some(Meter::new(STRUCTURE_HITS, STRUCTURE_HITS));
        self.insert_object(obj);
    }

    pub fn add_site(&self, id: impl Into<String>, position: Position, progress: u32, total: u32) {
        let mut obj = object(ObjectId::new(id), ObjectKind::ConstructionSite, position);
        obj.progress = Some(Meter::new(progress, total));
        self.insert_object(obj);
    }

    pub fn add_controller(&self, id: impl Into<String>, position: Position, downgrade_in: u32) {
        let mut obj = object(ObjectId::new(id), ObjectKind::Controller, position);
        obj.progress = Some(Meter::new(0, CONTROLLER_PROGRESS));
        obj.downgrade_in = Some(downgrade_in);
        self.insert_object(obj);
    }

    pub fn add_hostile(&self, id: impl Into<String>, position: Position, hits: u32) {
        let mut obj = object(ObjectId::new(id), ObjectKind::Hostile, position);
        obj.hits = Some(Meter::new(hits, hits));
        self.insert_object(obj);
    }

    pub fn add_drop(&self, id: impl Into<String>, position: Position, resource: ResourceType, amount: u32) {
        let mut obj = object(ObjectId::new(id), ObjectKind::DroppedResource, position);
        put(&mut obj.store, resource, amount);
        self.insert_object(obj);
    }

    pub fn add_wall(&self, position: Position) {
        self.state.borrow_mut().walls.insert(position);
    }

    /// Refuse drops made while standing on `position`.
    pub fn forbid_drops(&self, position: Position) {
        self.state.borrow_mut().no_drop.insert(position);
    }

    pub fn remove_object(&self, id: &ObjectId) {
        self.state.borrow_mut().objects.remove(id);
    }

    pub fn set_hits(&self, id: &ObjectId, hits: Meter) {
        if let Some(obj) = self.state.borrow_mut().objects.get_mut(id) {
            obj.hits = Some(hits);
        }
    }

    /// Total resources lying on the ground at `position`.
    pub fn drops_at(&self, position: &Position) -> u32 {
        self.state
            .borrow()
            .objects
            .values()
            .filter(|obj| obj.kind == ObjectKind::DroppedResource && &obj.position == position)
            .map(|obj| cargo_total(&obj.store))
            .sum()
    }

    /// Tiles next to `position` that nothing blocks.
    fn free_neighbours(state: &SimState, position: &Position) -> Vec<Position> {
        position
            .neighbours()
            .into_iter()
            .filter(|tile| !state.walls.contains(tile))
            .filter(|tile| {
                !state.objects.values().any(|obj| {
                    &obj.position == tile
                        && (obj.kind.is_structure()
                            || matches!(obj.kind, ObjectKind::Source | ObjectKind::Controller))
                })
            })
            .collect()
    }

    /// Spend energy on a work action against `target`.
    fn work_on(
        &self,
        agent: &AgentName,
        target: &ObjectId,
        accepts: fn(&ObjectView) -> bool,
        apply: fn(&mut ObjectView, u32, u32) -> u32,
    ) -> ActionResult {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(worker) = state.agents.get_mut(agent) else {
            return ActionResult::InvalidTarget;
        };
        let Some(obj) = state.objects.get_mut(target).filter(|obj| accepts(obj)) else {
            return ActionResult::InvalidTarget;
        };
        if !worker.position.is_within(&obj.position, WORK_RANGE) {
            return ActionResult::NotInRange;
        }
        if worker.loadout.work == 0 {
            return ActionResult::NoBodyPart;
        }
        let energy = worker.carried(ResourceType::Energy);
        if energy == 0 {
            return ActionResult::NotEnoughResources;
        }
        let spent = apply(obj, worker.loadout.work, energy);
        take(&mut worker.carry, ResourceType::Energy, spent);

        let complete = obj.kind == ObjectKind::ConstructionSite
            && obj.progress.is_some_and(|p| p.is_full());
        if complete {
            state.objects.remove(target);
        }
        ActionResult::Ok
    }
}

impl WorldQuery for SimWorld {
    fn tick(&self) -> Tick {
        self.state.borrow().tick
    }

    fn zones(&self) -> Vec<ZoneId> {
        let state = self.state.borrow();
        let zones: BTreeSet<ZoneId> = state
            .agents
            .values()
            .map(|a| a.position.zone.clone())
            .chain(state.objects.values().map(|o| o.position.zone.clone()))
            .collect();
        zones.into_iter().collect()
    }

    fn live_agents(&self) -> Vec<AgentView> {
        let state = self.state.borrow();
        state
            .agents
            .iter()
            .map(|(name, agent)| agent.view(name))
            .collect()
    }

    fn agent(&self, name: &AgentName) -> Option<AgentView> {
        self.state
            .borrow()
            .agents
            .get(name)
            .map(|agent| agent.view(name))
    }

    fn object(&self, id: &ObjectId) -> Option<ObjectView> {
        self.state.borrow().objects.get(id).cloned()
    }

    fn find(&self, zone: &ZoneId, kind: ObjectKind) -> Vec<ObjectView> {
        self.state
            .borrow()
            .objects
            .values()
            .filter(|obj| obj.kind == kind && &obj.position.zone == zone)
            .cloned()
            .collect()
    }

    fn harvest_spots(&self, source: &ObjectId) -> Vec<Position> {
        let state = self.state.borrow();
        match state.objects.get(source) {
            Some(obj) => Self::free_neighbours(&state, &obj.position),
            None => Vec::new(),
        }
    }
}

impl Movement for SimWorld {
    fn step_toward(&self, agent: &AgentName, target: &Position, range: u32) -> MoveOutcome {
        let mut state = self.state.borrow_mut();
        let Some(current) = state.agents.get(agent).map(|a| a.position.clone()) else {
            return MoveOutcome::NoPath;
        };
        let Some(distance) = current.range_to(target) else {
            return MoveOutcome::NoPath;
        };
        if distance <= range {
            return MoveOutcome::InRange;
        }

        let dx = (target.x - current.x).signum();
        let dy = (target.y - current.y).signum();
        let step = [(dx, dy), (dx, 0), (0, dy)]
            .into_iter()
            .filter(|&(x, y)| x != 0 || y != 0)
            .map(|(x, y)| Position {
                zone: current.zone.clone(),
                x: current.x + x,
                y: current.y + y,
            })
            .find(|tile| !state.walls.contains(tile));
        let Some(next) = step else {
            return MoveOutcome::NoPath;
        };
        if let Some(mover) = state.agents.get_mut(agent) {
            mover.position = next;
        }
        MoveOutcome::Moving
    }

    fn path_length(&self, from: &Position, to: &Position) -> Option<u32> {
        from.range_to(to)
    }
}

impl Actuator for SimWorld {
    fn harvest(&self, agent: &AgentName, source: &ObjectId) -> ActionResult {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(harvester) = state.agents.get_mut(agent) else {
            return ActionResult::InvalidTarget;
        };
        let Some(node) = state
            .objects
            .get_mut(source)
            .filter(|obj| obj.kind == ObjectKind::Source)
        else {
            return ActionResult::InvalidTarget;
        };
        if !harvester.position.is_within(&node.position, ADJACENT) {
            return ActionResult::NotInRange;
        }
        if harvester.loadout.work == 0 {
            return ActionResult::NoBodyPart;
        }
        if harvester.free() == 0 {
            return ActionResult::Full;
        }
        let available = node.stored(ResourceType::Energy);
        if available == 0 {
            return ActionResult::NotEnoughResources;
        }
        let amount = (harvester.loadout.work * HARVEST_PER_WORK)
            .min(available)
            .min(harvester.free());
        if let Some(left) = node.store.get_mut(&ResourceType::Energy) {
            *left -= amount;
        }
        put(&mut harvester.carry, ResourceType::Energy, amount);
        ActionResult::Ok
    }

    fn withdraw(
        &self,
        agent: &AgentName,
        from: &ObjectId,
        resource: ResourceType,
        amount: Option<u32>,
    ) -> ActionResult {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(hauler) = state.agents.get_mut(agent) else {
            return ActionResult::InvalidTarget;
        };
        let Some(store) = state
            .objects
            .get_mut(from)
            .filter(|obj| obj.kind.is_withdrawable())
        else {
            return ActionResult::InvalidTarget;
        };
        if !hauler.position.is_within(&store.position, ADJACENT) {
            return ActionResult::NotInRange;
        }
        if store.stored(resource) == 0 {
            return ActionResult::NotEnoughResources;
        }
        if hauler.free() == 0 {
            return ActionResult::Full;
        }
        let wanted = amount.unwrap_or(u32::MAX).min(hauler.free());
        let taken = take(&mut store.store, resource, wanted);
        put(&mut hauler.carry, resource, taken);
        ActionResult::Ok
    }

    fn pickup(&self, agent: &AgentName, drop: &ObjectId) -> ActionResult {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(hauler) = state.agents.get_mut(agent) else {
            return ActionResult::InvalidTarget;
        };
        let Some(pile) = state
            .objects
            .get_mut(drop)
            .filter(|obj| obj.kind == ObjectKind::DroppedResource)
        else {
            return ActionResult::InvalidTarget;
        };
        if !hauler.position.is_within(&pile.position, ADJACENT) {
            return ActionResult::NotInRange;
        }
        if hauler.free() == 0 {
            return ActionResult::Full;
        }
        let resources: Vec<ResourceType> = pile.store.keys().copied().collect();
        for resource in resources {
            let taken = take(&mut pile.store, resource, hauler.free());
            put(&mut hauler.carry, resource, taken);
        }
        if pile.store.is_empty() {
            state.objects.remove(drop);
        }
        ActionResult::Ok
    }

    fn transfer(
        &self,
        agent: &AgentName,
        to: TransferTarget<'_>,
        resource: ResourceType,
        amount: Option<u32>,
    ) -> ActionResult {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(giver) = state.agents.get(agent) else {
            return ActionResult::InvalidTarget;
        };
        let carried = giver.carried(resource);
        let from = giver.position.clone();

        let (position, free) = match to {
            TransferTarget::Object(id) => match state.objects.get(id) {
                Some(obj) if obj.store_capacity.is_some() => {
                    (obj.position.clone(), obj.free_capacity())
                }
                _ => return ActionResult::InvalidTarget,
            },
            TransferTarget::Agent(name) if name != agent => match state.agents.get(name) {
                Some(receiver) => (receiver.position.clone(), receiver.free()),
                None => return ActionResult::InvalidTarget,
            },
            TransferTarget::Agent(_) => return ActionResult::InvalidTarget,
        };
        if !from.is_within(&position, ADJACENT) {
            return ActionResult::NotInRange;
        }
        if carried == 0 {
            return ActionResult::NotEnoughResources;
        }
        if free == 0 {
            return ActionResult::Full;
        }

        let moved = amount.unwrap_or(carried).min(carried).min(free);
        if let Some(giver) = state.agents.get_mut(agent) {
            take(&mut giver.carry, resource, moved);
        }
        match to {
            TransferTarget::Object(id) => {
                if let Some(obj) = state.objects.get_mut(id) {
                    put(&mut obj.store, resource, moved);
                }
            }
            TransferTarget::Agent(name) => {
                if let Some(receiver) = state.agents.get_mut(name) {
                    put(&mut receiver.carry, resource, moved);
                }
            }
        }
        ActionResult::Ok
    }

    fn drop_resource(&self, agent: &AgentName, resource: ResourceType, amount: Option<u32>) -> ActionResult {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(dropper) = state.agents.get_mut(agent) else {
            return ActionResult::InvalidTarget;
        };
        let carried = dropper.carried(resource);
        if carried == 0 {
            return ActionResult::NotEnoughResources;
        }
        if state.no_drop.contains(&dropper.position) {
            return ActionResult::InvalidTarget;
        }
        let dropped = take(&mut dropper.carry, resource, amount.unwrap_or(carried));
        let position = dropper.position.clone();
        state.drop_at(&position, resource, dropped);
        ActionResult::Ok
    }

    fn build(&self, agent: &AgentName, site: &ObjectId) -> ActionResult {
        self.work_on(
            agent,
            site,
            |obj| obj.kind == ObjectKind::ConstructionSite,
            |obj, work, energy| {
                let Some(progress) = obj.progress.as_mut() else {
                    return 0;
                };
                let remaining = progress.total.saturating_sub(progress.current);
                let spent = (work * BUILD_PER_WORK).min(energy).min(remaining);
                progress.current += spent;
                spent
            },
        )
    }

    fn upgrade(&self, agent: &AgentName, controller: &ObjectId) -> ActionResult {
        self.work_on(
            agent,
            controller,
            |obj| obj.kind == ObjectKind::Controller,
            |obj, work, energy| {
                let spent = (work * UPGRADE_PER_WORK).min(energy);
                if let Some(progress) = obj.progress.as_mut() {
                    progress.current = (progress.current + spent) % progress.total.max(1);
                }
                obj.downgrade_in = Some(CONTROLLER_DOWNGRADE);
                spent
            },
        )
    }

    fn repair(&self, agent: &AgentName, structure: &ObjectId) -> ActionResult {
        self.work_on(
            agent,
            structure,
            |obj| obj.kind.is_structure() && obj.hits.is_some(),
            |obj, work, energy| {
                let Some(hits) = obj.hits.as_mut() else {
                    return 0;
                };
                let spent = work.min(energy);
                hits.current = (hits.current + spent * REPAIR_PER_WORK).min(hits.total);
                spent
            },
        )
    }

    fn attack(&self, agent: &AgentName, target: &ObjectId) -> ActionResult {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(attacker) = state.agents.get(agent) else {
            return ActionResult::InvalidTarget;
        };
        let Some(hostile) = state
            .objects
            .get_mut(target)
            .filter(|obj| obj.kind == ObjectKind::Hostile)
        else {
            return ActionResult::InvalidTarget;
        };
        if !attacker.position.is_within(&hostile.position, ADJACENT) {
            return ActionResult::NotInRange;
        }
        if attacker.loadout.attack == 0 {
            return ActionResult::NoBodyPart;
        }
        let damage = attacker.loadout.attack * ATTACK_PER_PART;
        let destroyed = match hostile.hits.as_mut() {
            Some(hits) => {
                hits.current = hits.current.saturating_sub(damage);
                hits.current == 0
            }
            None => true,
        };
        if destroyed {
            state.objects.remove(target);
        }
        ActionResult::Ok
    }
}
