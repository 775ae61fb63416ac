//! LoadoutCapabilities - ロードアウト（body parts）からの能力判定

use crate::domain::{AgentView, Loadout, TaskKind};
use crate::ports::Capabilities;

/// Judges agents purely by their body parts.
///
/// | kind | needs |
/// |------|-------|
/// | Harvest | work |
/// | Transport | carry |
/// | Build / Upgrade / Repair | work + carry |
/// | Attack | attack |
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadoutCapabilities;

impl LoadoutCapabilities {
    /// Parts that matter for `kind`, as a share of the whole loadout.
    fn useful_share(loadout: &Loadout, kind: TaskKind) -> f64 {
        let total = loadout.work + loadout.carry + loadout.mobility + loadout.attack;
        if total == 0 {
            return 0.0;
        }
        let useful = match kind {
            TaskKind::Harvest => loadout.work,
            TaskKind::Transport => loadout.carry + loadout.mobility,
            TaskKind::Build | TaskKind::Upgrade | TaskKind::Repair => loadout.work + loadout.carry,
            TaskKind::Attack => loadout.attack + loadout.mobility,
        };
        f64::from(useful) / f64::from(total)
    }
}

impl Capabilities for LoadoutCapabilities {
    fn satisfies(&self, agent: &AgentView, kind: TaskKind) -> bool {
        let l = &agent.loadout;
        match kind {
            TaskKind::Harvest => l.work > 0,
            TaskKind::Transport => l.carry > 0,
            TaskKind::Build | TaskKind::Upgrade | TaskKind::Repair => l.work > 0 && l.carry > 0,
            TaskKind::Attack => l.attack > 0,
        }
    }

    fn fitness(&self, agent: &AgentView, kind: TaskKind) -> f64 {
        if !self.satisfies(agent, kind) {
            return 0.0;
        }
        Self::useful_share(&agent.loadout, kind).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentName, Cargo, Position};
    use rstest::rstest;

    fn agent(work: u32, carry: u32, mobility: u32, attack: u32) -> AgentView {
        AgentView {
            name: AgentName::new("a"),
            position: Position::new("Z", 0, 0),
            loadout: Loadout {
                work,
                carry,
                mobility,
                attack,
            },
            carry: Cargo::new(),
            carry_capacity: carry * 50,
            ticks_to_live: 1500,
        }
    }

    #[rstest]
    #[case::harvester(agent(2, 0, 1, 0), TaskKind::Harvest, true)]
    #[case::hauler_cannot_build(agent(0, 4, 2, 0), TaskKind::Build, false)]
    #[case::hauler_transports(agent(0, 4, 2, 0), TaskKind::Transport, true)]
    #[case::worker_repairs(agent(1, 1, 1, 0), TaskKind::Repair, true)]
    #[case::worker_cannot_attack(agent(1, 1, 1, 0), TaskKind::Attack, false)]
    fn hard_requirements(#[case] agent: AgentView, #[case] kind: TaskKind, #[case] expected: bool) {
        assert_eq!(LoadoutCapabilities.satisfies(&agent, kind), expected);
    }

    #[test]
    fn fitness_prefers_specialists() {
        let specialist = agent(5, 0, 1, 0);
        let generalist = agent(1, 2, 2, 0);
        assert!(
            LoadoutCapabilities.fitness(&specialist, TaskKind::Harvest)
                > LoadoutCapabilities.fitness(&generalist, TaskKind::Harvest)
        );
        assert_eq!(LoadoutCapabilities.fitness(&generalist, TaskKind::Attack), 0.0);
    }
}
