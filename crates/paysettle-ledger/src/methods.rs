//! Withdrawal method book.
//!
//! Each owner has any number of methods and at most one default. Every
//! mutation checks ownership first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use paysettle_types::{
    MethodId, NewWithdrawalMethod, OwnerId, PaysettleError, Result, WithdrawalMethod,
};

#[derive(Debug, Default)]
pub struct MethodBook {
    methods: RwLock<HashMap<MethodId, WithdrawalMethod>>,
}

fn owned<'a>(
    methods: &'a mut HashMap<MethodId, WithdrawalMethod>,
    owner: OwnerId,
    id: MethodId,
) -> Result<&'a mut WithdrawalMethod> {
    let method = methods.get_mut(&id).ok_or(PaysettleError::MethodNotFound(id))?;
    if method.owner != owner {
        return Err(PaysettleError::MethodNotOwned(owner));
    }
    Ok(method)
}

impl MethodBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method. A new default unsets the owner's previous default.
    pub fn add(
        &self,
        owner: OwnerId,
        new: NewWithdrawalMethod,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalMethod> {
        if new.provider_account.trim().is_empty() {
            return Err(PaysettleError::invalid_request("provider account is empty"));
        }
        let mut methods = self.methods.write();
        if new.is_default {
            for m in methods.values_mut().filter(|m| m.owner == owner) {
                m.is_default = false;
            }
        }
        let method = WithdrawalMethod {
            id: MethodId::new(),
            owner,
            kind: new.kind,
            is_default: new.is_default,
            instant_capable: new.instant_capable,
            provider_account: new.provider_account,
            provider_label: new.provider_label,
            created_at: now,
        };
        methods.insert(method.id, method.clone());
        tracing::info!(owner = %owner, method = %method.id, kind = %method.kind, "withdrawal method added");
        Ok(method)
    }

    pub fn set_default(&self, owner: OwnerId, id: MethodId) -> Result<WithdrawalMethod> {
        let mut methods = self.methods.write();
        owned(&mut methods, owner, id)?;
        for m in methods.values_mut().filter(|m| m.owner == owner) {
            m.is_default = m.id == id;
        }
        methods
            .get(&id)
            .cloned()
            .ok_or(PaysettleError::MethodNotFound(id))
    }

    pub fn delete(&self, owner: OwnerId, id: MethodId) -> Result<WithdrawalMethod> {
        let mut methods = self.methods.write();
        owned(&mut methods, owner, id)?;
        methods.remove(&id).ok_or(PaysettleError::MethodNotFound(id))
    }

    pub fn mark_instant_capable(
        &self,
        owner: OwnerId,
        id: MethodId,
        instant_capable: bool,
    ) -> Result<WithdrawalMethod> {
        let mut methods = self.methods.write();
        let method = owned(&mut methods, owner, id)?;
        method.instant_capable = instant_capable;
        Ok(method.clone())
    }

    pub fn get(&self, id: MethodId) -> Result<WithdrawalMethod> {
        self.methods
            .read()
            .get(&id)
            .cloned()
            .ok_or(PaysettleError::MethodNotFound(id))
    }

    /// Load `id` and check it belongs to `owner`.
    pub fn get_owned(&self, owner: OwnerId, id: MethodId) -> Result<WithdrawalMethod> {
        let method = self.get(id)?;
        if method.owner != owner {
            return Err(PaysettleError::MethodNotOwned(owner));
        }
        Ok(method)
    }

    /// All methods of `owner`, oldest first.
    #[must_use]
    pub fn list(&self, owner: OwnerId) -> Vec<WithdrawalMethod> {
        let mut list: Vec<_> = self
            .methods
            .read()
            .values()
            .filter(|m| m.owner == owner)
            .cloned()
            .collect();
        list.sort_by_key(|m| (m.created_at, m.id));
        list
    }

    #[must_use]
    pub fn default_for(&self, owner: OwnerId) -> Option<WithdrawalMethod> {
        self.methods
            .read()
            .values()
            .find(|m| m.owner == owner && m.is_default)
            .cloned()
    }

    /// Resolve an explicit method or fall back to the owner's default.
    pub fn resolve(&self, owner: OwnerId, id: Option<MethodId>) -> Result<WithdrawalMethod> {
        match id {
            Some(id) => self.get_owned(owner, id),
            None => self.default_for(owner).ok_or(PaysettleError::NoDefaultMethod),
        }
    }
}
