//! The small integer-keyed property map carried by every packet but `Close`.

/// Known property keys. The wire format accepts any `u8`; unrecognized
/// keys round-trip as [`Property::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Property {
    ConnId,
    UserId,
    Channel,
    ClientId,
    Password,
    Other(u8),
}

impl From<u8> for Property {
    fn from(v: u8) -> Self {
        match v {
            1 => Property::ConnId,
            2 => Property::UserId,
            3 => Property::Channel,
            4 => Property::ClientId,
            5 => Property::Password,
            other => Property::Other(other),
        }
    }
}

impl From<Property> for u8 {
    fn from(p: Property) -> Self {
        match p {
            Property::ConnId => 1,
            Property::UserId => 2,
            Property::Channel => 3,
            Property::ClientId => 4,
            Property::Password => 5,
            Property::Other(v) => v,
        }
    }
}

/// Bounded to 255 entries (the wire count is a single byte). Preserves
/// insertion order; lookup is linear, which is the right tradeoff at this
/// size and keeps the wire round-trip byte-for-byte predictable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap(Vec<(u8, String)>);

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<Property>, value: impl Into<String>) -> &mut Self {
        let key: u8 = key.into().into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: impl Into<Property>) -> Option<&str> {
        let key: u8 = key.into().into();
        self.0
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Property, &str)> {
        self.0.iter().map(|(k, v)| (Property::from(*k), v.as_str()))
    }

    pub(crate) fn as_pairs(&self) -> &[(u8, String)] {
        &self.0
    }

    pub(crate) fn from_pairs(pairs: Vec<(u8, String)>) -> Self {
        Self(pairs)
    }
}

impl FromIterator<(Property, String)> for PropertyMap {
    fn from_iter<T: IntoIterator<Item = (Property, String)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
