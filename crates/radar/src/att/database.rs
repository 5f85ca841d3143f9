//! Attribute database backing the GATT server
use super::constants::*;
use super::error::{AttError, AttResult};
use super::types::{AttPermissions, PendingWrite};
use crate::uuid::Uuid;
use std::collections::BTreeMap;
use std::fmt;

/// An attribute in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute handle
    pub handle: u16,
    /// Attribute type (UUID)
    pub type_: Uuid,
    /// Attribute value
    pub value: Vec<u8>,
    /// Attribute permissions
    pub permissions: AttPermissions,
}

impl Attribute {
    /// Create a new attribute
    pub fn new(handle: u16, type_: Uuid, value: Vec<u8>, permissions: AttPermissions) -> Self {
        Self {
            handle,
            type_,
            value,
            permissions,
        }
    }

    /// Read the attribute value on behalf of a peer
    pub fn read(&self) -> AttResult<&[u8]> {
        if !self.permissions.can_read() {
            return Err(AttError::ReadNotPermitted);
        }
        Ok(&self.value)
    }

    /// Write the attribute value on behalf of a peer
    pub fn write(&mut self, value: &[u8]) -> AttResult<()> {
        if !self.permissions.can_write() {
            return Err(AttError::WriteNotPermitted);
        }
        self.value = value.to_vec();
        Ok(())
    }
}

/// Hook consulted before a peer write is committed. Returning an error rejects the write.
pub type WriteAuthorizer = Box<dyn Fn(&PendingWrite) -> AttResult<()>>;

/// Attribute database
///
/// Handles are allocated densely from [`ATT_HANDLE_MIN`]. The database is owned by a
/// single control context, so all mutation goes through `&mut self`.
pub struct AttributeDatabase {
    /// Map of handles to attributes
    attributes: BTreeMap<u16, Attribute>,
    /// Map of handles to write authorization hooks
    authorizers: BTreeMap<u16, WriteAuthorizer>,
    /// Next available handle; one past [`ATT_HANDLE_MAX`] once exhausted
    next_handle: u32,
}

impl Default for AttributeDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AttributeDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDatabase")
            .field("attributes", &self.attributes)
            .field("authorized_handles", &self.authorizers.keys().collect::<Vec<_>>())
            .field("next_handle", &self.next_handle)
            .finish()
    }
}

impl AttributeDatabase {
    /// Create a new empty attribute database
    pub fn new() -> Self {
        Self {
            attributes: BTreeMap::new(),
            authorizers: BTreeMap::new(),
            next_handle: ATT_HANDLE_MIN as u32,
        }
    }

    /// Handle the next call to [`add_attribute_with_next_handle`](Self::add_attribute_with_next_handle) will use
    pub fn next_handle(&self) -> AttResult<u16> {
        u16::try_from(self.next_handle).map_err(|_| AttError::InsufficientResources)
    }

    /// Add an attribute to the database
    pub fn add_attribute(&mut self, attr: Attribute) -> AttResult<u16> {
        let handle = attr.handle;
        if handle < ATT_HANDLE_MIN {
            return Err(AttError::InvalidHandle(handle));
        }
        if self.attributes.contains_key(&handle) {
            return Err(AttError::InvalidParameter(format!("Duplicate handle: {}", handle)));
        }

        if handle as u32 >= self.next_handle {
            self.next_handle = handle as u32 + 1;
        }

        self.attributes.insert(handle, attr);
        Ok(handle)
    }

    /// Add an attribute with the next available handle
    pub fn add_attribute_with_next_handle(
        &mut self,
        type_: Uuid,
        value: Vec<u8>,
        permissions: AttPermissions,
    ) -> AttResult<u16> {
        let handle = self.next_handle()?;
        self.add_attribute(Attribute::new(handle, type_, value, permissions))
    }

    /// Register a write authorization hook for a handle
    pub fn register_write_authorizer(
        &mut self,
        handle: u16,
        authorizer: WriteAuthorizer,
    ) -> AttResult<()> {
        if !self.attributes.contains_key(&handle) {
            return Err(AttError::InvalidHandle(handle));
        }
        self.authorizers.insert(handle, authorizer);
        Ok(())
    }

    /// Read an attribute value by handle, enforcing read permission
    pub fn read_by_handle(&self, handle: u16) -> AttResult<Vec<u8>> {
        let attr = self
            .attributes
            .get(&handle)
            .ok_or(AttError::InvalidHandle(handle))?;
        Ok(attr.read()?.to_vec())
    }

    /// Apply a peer write.
    ///
    /// Attributes with a registered hook are authorized first and the hook owns offset and
    /// length validation. Without a hook only whole-value writes at offset 0 are accepted.
    pub fn write_by_handle(&mut self, write: &PendingWrite) -> AttResult<()> {
        let attr = self
            .attributes
            .get_mut(&write.handle)
            .ok_or(AttError::InvalidHandle(write.handle))?;

        if !attr.permissions.can_write() {
            return Err(AttError::WriteNotPermitted);
        }

        match self.authorizers.get(&write.handle) {
            Some(authorize) => authorize(write)?,
            None if attr.permissions.write_requires_authorization() => {
                return Err(AttError::InsufficientAuthorization);
            }
            None if write.offset != 0 => return Err(AttError::InvalidOffset(write.offset)),
            None => {}
        }

        attr.write(&write.data)
    }

    /// Replace an attribute value locally, bypassing peer permissions
    pub fn set_value(&mut self, handle: u16, value: &[u8]) -> AttResult<()> {
        let attr = self
            .attributes
            .get_mut(&handle)
            .ok_or(AttError::InvalidHandle(handle))?;
        attr.value = value.to_vec();
        Ok(())
    }

    /// Get an attribute by handle
    pub fn get_attribute(&self, handle: u16) -> AttResult<&Attribute> {
        self.attributes
            .get(&handle)
            .ok_or(AttError::AttributeNotFound)
    }

    /// Number of attributes in the database
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::att::error::AttErrorCode;

    fn value_uuid() -> Uuid {
        Uuid::from_u16(0x2A19)
    }

    #[test]
    fn test_handles_allocated_in_order() {
        let mut db = AttributeDatabase::new();
        let a = db
            .add_attribute_with_next_handle(value_uuid(), vec![1], AttPermissions::read_only())
            .unwrap();
        let b = db
            .add_attribute_with_next_handle(value_uuid(), vec![2], AttPermissions::read_only())
            .unwrap();
        assert_eq!(a, ATT_HANDLE_MIN);
        assert_eq!(b, a + 1);
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let mut db = AttributeDatabase::new();
        let attr = Attribute::new(5, value_uuid(), vec![], AttPermissions::read_only());
        db.add_attribute(attr.clone()).unwrap();
        assert!(matches!(
            db.add_attribute(attr),
            Err(AttError::InvalidParameter(_))
        ));
        assert_eq!(db.next_handle().unwrap(), 6);
    }

    #[test]
    fn test_handle_space_exhaustion() {
        let mut db = AttributeDatabase::new();
        db.add_attribute(Attribute::new(
            ATT_HANDLE_MAX,
            value_uuid(),
            vec![],
            AttPermissions::read_only(),
        ))
        .unwrap();
        assert_eq!(
            db.add_attribute_with_next_handle(value_uuid(), vec![], AttPermissions::read_only()),
            Err(AttError::InsufficientResources)
        );
    }

    #[test]
    fn test_read_only_attribute_rejects_write() {
        let mut db = AttributeDatabase::new();
        let handle = db
            .add_attribute_with_next_handle(value_uuid(), vec![7], AttPermissions::read_only())
            .unwrap();
        assert_eq!(
            db.write_by_handle(&PendingWrite::new(handle, vec![1])),
            Err(AttError::WriteNotPermitted)
        );
        assert_eq!(db.read_by_handle(handle).unwrap(), vec![7]);
    }

    #[test]
    fn test_unhooked_write_rejects_offset() {
        let mut db = AttributeDatabase::new();
        let handle = db
            .add_attribute_with_next_handle(value_uuid(), vec![0, 0], AttPermissions::read_write())
            .unwrap();
        assert_eq!(
            db.write_by_handle(&PendingWrite::new(handle, vec![1]).with_offset(1)),
            Err(AttError::InvalidOffset(1))
        );
        db.write_by_handle(&PendingWrite::new(handle, vec![1, 0])).unwrap();
        assert_eq!(db.read_by_handle(handle).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_authorizer_decides_before_commit() {
        let mut db = AttributeDatabase::new();
        let handle = db
            .add_attribute_with_next_handle(
                value_uuid(),
                vec![0],
                AttPermissions::read_write_authorized(),
            )
            .unwrap();

        db.register_write_authorizer(
            handle,
            Box::new(|write| {
                if write.data.first() == Some(&0xFF) {
                    Err(AttError::Protocol(AttErrorCode::WriteNotPermitted, write.handle))
                } else {
                    Ok(())
                }
            }),
        )
        .unwrap();

        assert!(db.write_by_handle(&PendingWrite::new(handle, vec![0xFF])).is_err());
        assert_eq!(db.read_by_handle(handle).unwrap(), vec![0]);

        db.write_by_handle(&PendingWrite::new(handle, vec![3])).unwrap();
        assert_eq!(db.read_by_handle(handle).unwrap(), vec![3]);
    }

    #[test]
    fn test_authorized_attribute_without_hook_is_refused() {
        let mut db = AttributeDatabase::new();
        let handle = db
            .add_attribute_with_next_handle(
                value_uuid(),
                vec![0],
                AttPermissions::read_write_authorized(),
            )
            .unwrap();
        assert_eq!(
            db.write_by_handle(&PendingWrite::new(handle, vec![1])),
            Err(AttError::InsufficientAuthorization)
        );
    }

    #[test]
    fn test_hook_requires_existing_attribute() {
        let mut db = AttributeDatabase::new();
        assert_eq!(
            db.register_write_authorizer(42, Box::new(|_| Ok(()))),
            Err(AttError::InvalidHandle(42))
        );
    }
}
