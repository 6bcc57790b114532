//! Session-scoped attribute table.
//!
//! The table owns every service, characteristic and descriptor a session
//! has discovered, keyed by a [`Handle`] the table assigns from an
//! incrementing counter. Handles start at 1 and are never reused while the
//! table lives. Each record keeps the transport's [`RemoteId`], its parent,
//! its UUID, its cached value and the ordered set of its children.
//!
//! Only the session's state machine mutates the table. Once a service is
//! frozen (its details are fully discovered) no further children can be
//! added below it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use thiserror::Error;

use gattkit_types::{CharacteristicProperties, Handle, RemoteId, ServiceKind, Uuid};

/// Structural violations rejected by the table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("unknown parent {0}")]
    UnknownParent(Handle),
    #[error("{handle} is not a {expected}")]
    WrongKind {
        handle: Handle,
        expected: &'static str,
    },
    #[error("remote id {remote} already belongs to {existing}")]
    RemoteConflict { remote: RemoteId, existing: Handle },
    #[error("service {0} is already fully discovered")]
    Frozen(Handle),
    #[error("{0} has no value")]
    NoValue(Handle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub remote: RemoteId,
    pub uuid: Uuid,
    pub kind: ServiceKind,
    pub characteristics: BTreeSet<Handle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicRecord {
    pub remote: RemoteId,
    pub service: Handle,
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub value: Vec<u8>,
    pub descriptors: BTreeSet<Handle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRecord {
    pub remote: RemoteId,
    pub characteristic: Handle,
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

/// One entry of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    Service(ServiceRecord),
    Characteristic(CharacteristicRecord),
    Descriptor(DescriptorRecord),
}

impl Attribute {
    pub fn uuid(&self) -> Uuid {
        match self {
            Attribute::Service(s) => s.uuid,
            Attribute::Characteristic(c) => c.uuid,
            Attribute::Descriptor(d) => d.uuid,
        }
    }

    pub fn remote(&self) -> RemoteId {
        match self {
            Attribute::Service(s) => s.remote,
            Attribute::Characteristic(c) => c.remote,
            Attribute::Descriptor(d) => d.remote,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Attribute::Service(_) => "service",
            Attribute::Characteristic(_) => "characteristic",
            Attribute::Descriptor(_) => "descriptor",
        }
    }
}

/// Handle-indexed store of everything one session has discovered.
#[derive(Debug)]
pub struct AttributeTable {
    next: u32,
    attributes: BTreeMap<Handle, Attribute>,
    by_remote: HashMap<RemoteId, Handle>,
    frozen: HashSet<Handle>,
}

impl Default for AttributeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeTable {
    pub fn new() -> Self {
        Self {
            next: 1,
            attributes: BTreeMap::new(),
            by_remote: HashMap::new(),
            frozen: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Insert a top-level or included service.
    ///
    /// Re-inserting a service with a known remote id returns the existing
    /// handle.
    pub fn insert_service(
        &mut self,
        remote: RemoteId,
        uuid: Uuid,
        kind: ServiceKind,
    ) -> Result<Handle, TableError> {
        if let Some(existing) = self.existing(remote, None)? {
            return Ok(existing);
        }
        let handle = self.allocate(remote);
        self.attributes.insert(
            handle,
            Attribute::Service(ServiceRecord {
                remote,
                uuid,
                kind,
                characteristics: BTreeSet::new(),
            }),
        );
        Ok(handle)
    }

    /// Insert a characteristic below `service`.
    pub fn insert_characteristic(
        &mut self,
        service: Handle,
        remote: RemoteId,
        uuid: Uuid,
        properties: CharacteristicProperties,
    ) -> Result<Handle, TableError> {
        self.service(service).ok_or_else(|| self.parent_error(service, "service"))?;
        if self.frozen.contains(&service) {
            return Err(TableError::Frozen(service));
        }
        if let Some(existing) = self.existing(remote, Some(service))? {
            return Ok(existing);
        }

        let handle = self.allocate(remote);
        self.attributes.insert(
            handle,
            Attribute::Characteristic(CharacteristicRecord {
                remote,
                service,
                uuid,
                properties,
                value: Vec::new(),
                descriptors: BTreeSet::new(),
            }),
        );
        if let Some(Attribute::Service(record)) = self.attributes.get_mut(&service) {
            record.characteristics.insert(handle);
        }
        Ok(handle)
    }

    /// Insert a descriptor below `characteristic`.
    pub fn insert_descriptor(
        &mut self,
        characteristic: Handle,
        remote: RemoteId,
        uuid: Uuid,
    ) -> Result<Handle, TableError> {
        let service = self
            .characteristic(characteristic)
            .map(|c| c.service)
            .ok_or_else(|| self.parent_error(characteristic, "characteristic"))?;
        if self.frozen.contains(&service) {
            return Err(TableError::Frozen(service));
        }
        if let Some(existing) = self.existing(remote, Some(characteristic))? {
            return Ok(existing);
        }

        let handle = self.allocate(remote);
        self.attributes.insert(
            handle,
            Attribute::Descriptor(DescriptorRecord {
                remote,
                characteristic,
                uuid,
                value: Vec::new(),
            }),
        );
        if let Some(Attribute::Characteristic(record)) = self.attributes.get_mut(&characteristic) {
            record.descriptors.insert(handle);
        }
        Ok(handle)
    }

    /// Replace the cached value of a characteristic or descriptor.
    pub fn update_value(&mut self, handle: Handle, value: Vec<u8>) -> Result<(), TableError> {
        match self.attributes.get_mut(&handle) {
            Some(Attribute::Characteristic(c)) => c.value = value,
            Some(Attribute::Descriptor(d)) => d.value = value,
            Some(Attribute::Service(_)) => return Err(TableError::NoValue(handle)),
            None => return Err(TableError::UnknownParent(handle)),
        }
        Ok(())
    }

    /// Mark a service's children as complete.
    pub fn freeze(&mut self, service: Handle) {
        self.frozen.insert(service);
    }

    pub fn is_frozen(&self, service: Handle) -> bool {
        self.frozen.contains(&service)
    }

    pub fn get(&self, handle: Handle) -> Option<&Attribute> {
        self.attributes.get(&handle)
    }

    pub fn service(&self, handle: Handle) -> Option<&ServiceRecord> {
        match self.attributes.get(&handle) {
            Some(Attribute::Service(s)) => Some(s),
            _ => None,
        }
    }

    pub fn characteristic(&self, handle: Handle) -> Option<&CharacteristicRecord> {
        match self.attributes.get(&handle) {
            Some(Attribute::Characteristic(c)) => Some(c),
            _ => None,
        }
    }

    pub fn descriptor(&self, handle: Handle) -> Option<&DescriptorRecord> {
        match self.attributes.get(&handle) {
            Some(Attribute::Descriptor(d)) => Some(d),
            _ => None,
        }
    }

    /// The service an attribute ultimately belongs to.
    pub fn service_of(&self, handle: Handle) -> Option<Handle> {
        match self.attributes.get(&handle)? {
            Attribute::Service(_) => Some(handle),
            Attribute::Characteristic(c) => Some(c.service),
            Attribute::Descriptor(d) => self.characteristic(d.characteristic).map(|c| c.service),
        }
    }

    /// Every service, in handle order.
    pub fn services(&self) -> impl Iterator<Item = (Handle, &ServiceRecord)> {
        self.attributes.iter().filter_map(|(h, a)| match a {
            Attribute::Service(s) => Some((*h, s)),
            _ => None,
        })
    }

    /// Every attribute with the given UUID, in handle order.
    pub fn find_by_uuid(&self, uuid: Uuid) -> Vec<Handle> {
        self.attributes
            .iter()
            .filter(|(_, a)| a.uuid() == uuid)
            .map(|(h, _)| *h)
            .collect()
    }

    /// The handle assigned to a transport-side identifier.
    pub fn find_by_remote(&self, remote: RemoteId) -> Option<Handle> {
        self.by_remote.get(&remote).copied()
    }

    fn allocate(&mut self, remote: RemoteId) -> Handle {
        let handle = Handle::new(self.next);
        self.next += 1;
        self.by_remote.insert(remote, handle);
        handle
    }

    /// Resolve a remote id that is already known. Only a re-insert under the
    /// same parent is accepted.
    fn existing(
        &self,
        remote: RemoteId,
        parent: Option<Handle>,
    ) -> Result<Option<Handle>, TableError> {
        let Some(existing) = self.by_remote.get(&remote).copied() else {
            return Ok(None);
        };
        let same_parent = match (self.attributes.get(&existing), parent) {
            (Some(Attribute::Service(_)), None) => true,
            (Some(Attribute::Characteristic(c)), Some(p)) => c.service == p,
            (Some(Attribute::Descriptor(d)), Some(p)) => d.characteristic == p,
            _ => false,
        };
        if same_parent {
            Ok(Some(existing))
        } else {
            Err(TableError::RemoteConflict { remote, existing })
        }
    }

    fn parent_error(&self, handle: Handle, expected: &'static str) -> TableError {
        match self.attributes.get(&handle) {
            Some(other) if other.kind_name() != expected => {
                TableError::WrongKind { handle, expected }
            }
            _ => TableError::UnknownParent(handle),
        }
    }
}
