use std::{any::Any, collections::HashMap};

use log::debug;

use crate::{protocol::ProtocolError, serialization::type_key::TypeKey};

/// A static catalog entry (a "def"), identified across peers by its stable name.
pub trait CatalogEntry: Clone + 'static {
    fn def_name(&self) -> &str;
}

/// Maps a def name to its preferred short hash. Zero is reserved for "none".
pub fn preferred_short_hash(name: &str) -> u16 {
    let hash = crc32fast::hash(name.as_bytes());
    (hash % u32::from(u16::MAX)) as u16 + 1
}

struct DefDatabase {
    type_name: &'static str,
    entries: Vec<Box<dyn Any>>,
    by_name: HashMap<String, usize>,
    hash_by_name: HashMap<String, u16>,
    index_by_hash: HashMap<u16, usize>,
}

impl DefDatabase {
    fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            entries: Vec::new(),
            by_name: HashMap::new(),
            hash_by_name: HashMap::new(),
            index_by_hash: HashMap::new(),
        }
    }

    // Short hashes are assigned in sorted-name order so the result does not
    // depend on the order defs were loaded in. Collisions probe upwards,
    // wrapping past 65535 to 1.
    fn rebuild_hashes(&mut self) {
        let mut names: Vec<(&String, &usize)> = self.by_name.iter().collect();
        names.sort();

        self.hash_by_name.clear();
        self.index_by_hash.clear();
        for (name, index) in names {
            let mut hash = preferred_short_hash(name);
            while self.index_by_hash.contains_key(&hash) {
                hash = if hash == u16::MAX { 1 } else { hash + 1 };
            }
            if hash != preferred_short_hash(name) {
                debug!(
                    "Def `{}` in {} collided, probed to short hash {}",
                    name, self.type_name, hash
                );
            }
            self.hash_by_name.insert(name.clone(), hash);
            self.index_by_hash.insert(hash, *index);
        }
    }
}

/// Process-wide databases of defs, one per def type.
#[derive(Default)]
pub struct DefCatalog {
    databases: HashMap<TypeKey, DefDatabase>,
}

impl DefCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<D: CatalogEntry>(
        &mut self,
        defs: impl IntoIterator<Item = D>,
    ) -> Result<(), ProtocolError> {
        let key = TypeKey::of::<D>();
        let database = self
            .databases
            .entry(key)
            .or_insert_with(|| DefDatabase::new(key.name()));

        for def in defs {
            let name = def.def_name().to_string();
            if database.by_name.contains_key(&name) {
                return Err(ProtocolError::DuplicateType { name });
            }
            // 0 is reserved, leaving 65535 usable hashes
            if database.entries.len() >= usize::from(u16::MAX) {
                return Err(ProtocolError::TooManyDefs {
                    catalog: key.name().to_string(),
                });
            }
            database.by_name.insert(name, database.entries.len());
            database.entries.push(Box::new(def));
        }
        database.rebuild_hashes();
        Ok(())
    }

    pub fn short_hash<D: CatalogEntry>(&self, name: &str) -> Option<u16> {
        self.databases
            .get(&TypeKey::of::<D>())?
            .hash_by_name
            .get(name)
            .copied()
    }

    pub(crate) fn short_hash_in(&self, catalog: TypeKey, name: &str) -> Option<u16> {
        self.databases.get(&catalog)?.hash_by_name.get(name).copied()
    }

    pub fn get<D: CatalogEntry>(&self, hash: u16) -> Option<&D> {
        let database = self.databases.get(&TypeKey::of::<D>())?;
        let index = database.index_by_hash.get(&hash)?;
        database.entries.get(*index)?.downcast_ref::<D>()
    }

    pub fn get_by_name<D: CatalogEntry>(&self, name: &str) -> Option<&D> {
        let database = self.databases.get(&TypeKey::of::<D>())?;
        let index = database.by_name.get(name)?;
        database.entries.get(*index)?.downcast_ref::<D>()
    }

    pub fn len<D: CatalogEntry>(&self) -> usize {
        self.databases
            .get(&TypeKey::of::<D>())
            .map_or(0, |database| database.entries.len())
    }
}
