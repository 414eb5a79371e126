use std::sync::Arc;

use config::Config;

use crate::address::{Address, AddressDomain};
use crate::kernel::pool::{ExhaustedError, PagedPool, PinGuard};

/// A directory mapping addresses of one domain to live entities.
///
/// Thin domain-tagged wrapper over the paged slot pool: it mints addresses
/// on registration and checks domain and generation on every resolve, which
/// is the sole defence against stale addresses reaching a slot's next
/// occupant.
pub(crate) struct Directory<T> {
    pool: PagedPool<T>,
    domain: AddressDomain,
}

impl<T> Directory<T> {
    pub fn new(domain: AddressDomain, capacity: u32) -> Self {
        Directory {
            pool: PagedPool::new(capacity),
            domain,
        }
    }

    /// Reserves a slot and mints the address for its next occupant.
    pub fn reserve(&self) -> Result<Address, ExhaustedError> {
        let (index, generation) = self.pool.reserve()?;
        Ok(Address::new(self.domain, index, generation))
    }

    pub fn install(&self, address: Address, entity: Arc<T>) {
        self.pool.install(address.index(), entity);
    }

    pub fn cancel(&self, address: Address) {
        self.pool.cancel(address.index());
    }

    pub fn get(&self, address: Address) -> Option<Arc<T>> {
        if address.domain() != self.domain || address.is_null() {
            return None;
        }
        self.pool.get(address.index(), address.generation())
    }

    /// Resolves and pins in one step, holding the slot against reuse for
    /// the guard's lifetime.
    pub fn pin(&self, address: Address) -> Option<(Arc<T>, PinGuard<'_, T>)> {
        if address.domain() != self.domain || address.is_null() {
            return None;
        }
        self.pool.pin(address.index(), address.generation())
    }

    /// Removes the entity so the address stops resolving.
    pub fn retire(&self, address: Address) -> Option<Arc<T>> {
        if address.domain() != self.domain || address.is_null() {
            return None;
        }
        self.pool.retire(address.index(), address.generation())
    }

    pub fn for_each<F: FnMut(&Arc<T>)>(&self, f: F) {
        self.pool.for_each(f)
    }

    pub fn len(&self) -> u32 {
        self.pool.len()
    }
}

#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    pub max_actors: u32,
    pub max_receivers: u32,
}

impl From<&Config> for DirectoryConfig {
    fn from(config: &Config) -> Self {
        DirectoryConfig {
            max_actors: config.get_int("directory.max_actors").unwrap() as u32,
            max_receivers: config.get_int("directory.max_receivers").unwrap() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_mismatch_does_not_resolve() {
        let actors: Directory<u32> = Directory::new(AddressDomain::Actor, 8);
        let address = actors.reserve().unwrap();
        actors.install(address, Arc::new(5));

        assert_eq!(address.domain(), AddressDomain::Actor);
        assert!(actors.get(address).is_some());

        let receivers: Directory<u32> = Directory::new(AddressDomain::Receiver, 8);
        assert!(receivers.get(address).is_none());
    }

    #[test]
    fn test_null_address_does_not_resolve() {
        let actors: Directory<u32> = Directory::new(AddressDomain::Actor, 8);
        assert!(actors.get(Address::null()).is_none());
        assert!(actors.pin(Address::null()).is_none());
        assert!(actors.retire(Address::null()).is_none());
    }

    #[test]
    fn test_stale_address_after_reuse() {
        let actors: Directory<u32> = Directory::new(AddressDomain::Actor, 8);
        let first = actors.reserve().unwrap();
        actors.install(first, Arc::new(1));
        actors.retire(first).unwrap();

        let second = actors.reserve().unwrap();
        actors.install(second, Arc::new(2));

        // Same slot, younger generation: the old address is dead.
        assert_eq!(second.index(), first.index());
        assert!(second.generation() > first.generation());
        assert!(actors.get(first).is_none());
        assert_eq!(*actors.get(second).unwrap(), 2);
    }
}
