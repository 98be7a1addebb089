use std::collections::HashMap;

use crate::connection::{ConnId, Member};

/// The set of live connections. Only ever touched by the hub worker.
pub(crate) struct Membership<S> {
    members: HashMap<ConnId, Member<S>>,
}

impl<S> Membership<S> {
    pub(crate) fn new() -> Self {
        Self {
            members: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: ConnId) -> bool {
        self.members.contains_key(&id)
    }

    /// Add a member. A member whose id is already present is handed back
    /// untouched and the existing entry is kept.
    pub(crate) fn insert(&mut self, member: Member<S>) -> Result<(), Member<S>> {
        let id = member.id();
        if self.members.contains_key(&id) {
            return Err(member);
        }
        self.members.insert(id, member);
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: ConnId) -> Option<Member<S>> {
        self.members.remove(&id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Member<S>> {
        self.members.values_mut()
    }

    pub(crate) fn drain(&mut self) -> Vec<Member<S>> {
        self.members.drain().map(|(_, member)| member).collect()
    }
}
