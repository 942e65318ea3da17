use crate::agent::{Agent, AgentId};
use tracing::debug;

/// Where an agent is on its way out of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Active,
    PendingRemoval,
    Removed,
}

/// The host's delete hook. Deleting an id that is already gone must be a no-op.
pub trait Despawner {
    fn despawn(&mut self, id: AgentId);
}

/// Hand every agent marked for removal to `host` and mark it removed.
/// Returns how many were handed over; a second sweep finds none.
pub fn sweep<D: Despawner + ?Sized>(agents: &mut [Agent], host: &mut D) -> usize {
    let mut removed = 0;
    for agent in agents.iter_mut().filter(|a| a.lifecycle() == Lifecycle::PendingRemoval) {
        host.despawn(agent.id());
        agent.set_lifecycle(Lifecycle::Removed);
        removed += 1;
    }
    if removed > 0 {
        debug!(removed, "swept agents marked for removal");
    }
    removed
}
