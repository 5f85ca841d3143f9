//! GATT Server implementation
//!
//! This module provides the server side of the GATT attribute table, building on top of
//! the ATT attribute database. Connection handling and PDU transport belong to the
//! radio stack; it hands inbound reads and writes to [`GattServer::handle_read`] and
//! [`GattServer::handle_write`] and drains outbound notifications with
//! [`GattServer::drain_updates`].

use super::types::{Characteristic, CharacteristicProperty, Service, Subscription};
use crate::att::{
    AttError, AttPermissions, AttResult, AttributeDatabase, HandleValueUpdate, PendingWrite,
    UpdateKind, WriteAuthorizer, ATT_DEFAULT_MTU, CCCD_VALUE_LEN, CHARACTERISTIC_UUID,
    CLIENT_CHAR_CONFIG_UUID, PRIMARY_SERVICE_UUID, SECONDARY_SERVICE_UUID,
};
use crate::uuid::Uuid;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
use std::collections::{BTreeMap, VecDeque};

/// GATT Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattServerConfig {
    /// Negotiated MTU; notification payloads are limited to `mtu - 3` bytes
    pub mtu: u16,
    /// Maximum number of updates held for the radio stack before the oldest is dropped
    pub max_pending_updates: usize,
}

impl Default for GattServerConfig {
    fn default() -> Self {
        Self {
            mtu: ATT_DEFAULT_MTU,
            max_pending_updates: 32,
        }
    }
}

/// GATT characteristic bookkeeping
#[derive(Debug, Clone)]
struct GattCharacteristic {
    declaration_handle: u16,
    value_handle: u16,
    cccd_handle: Option<u16>,
    uuid: Uuid,
    properties: CharacteristicProperty,
}

/// A GATT service with characteristics
#[derive(Debug, Clone)]
struct GattService {
    handle: u16,
    uuid: Uuid,
    is_primary: bool,
    /// Value handles of the service characteristics, in declaration order
    characteristics: Vec<u16>,
    end_handle: u16,
}

/// What an accepted peer write changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A characteristic value was committed
    Value { handle: u16, value: Vec<u8> },
    /// A client changed its subscription on a characteristic
    Subscription {
        value_handle: u16,
        subscription: Subscription,
    },
}

/// A GATT server
#[derive(Debug, Default)]
pub struct GattServer {
    config: GattServerConfig,
    database: AttributeDatabase,
    /// Services by declaration handle
    services: BTreeMap<u16, GattService>,
    /// Characteristics by value handle
    characteristics: BTreeMap<u16, GattCharacteristic>,
    /// CCCD handle -> characteristic value handle
    cccds: BTreeMap<u16, u16>,
    /// Current subscription per characteristic value handle
    subscriptions: BTreeMap<u16, Subscription>,
    /// Updates waiting for the radio stack
    outbound: VecDeque<HandleValueUpdate>,
}

impl GattServer {
    /// Create a new GATT server
    pub fn new(config: GattServerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Get GATT server configuration
    pub fn config(&self) -> &GattServerConfig {
        &self.config
    }

    /// Update the MTU after the radio stack negotiated a new one
    pub fn set_mtu(&mut self, mtu: u16) {
        self.config.mtu = mtu.max(ATT_DEFAULT_MTU);
    }

    /// Underlying attribute database
    pub fn database(&self) -> &AttributeDatabase {
        &self.database
    }

    /// Add a service to the GATT server
    pub fn add_service(&mut self, uuid: Uuid, is_primary: bool) -> AttResult<u16> {
        if self.services.values().any(|svc| svc.uuid == uuid) {
            return Err(AttError::InvalidParameter(format!(
                "Service {} already registered",
                uuid
            )));
        }

        let service_type = if is_primary {
            PRIMARY_SERVICE_UUID
        } else {
            SECONDARY_SERVICE_UUID
        };

        let handle = self.database.add_attribute_with_next_handle(
            Uuid::from_u16(service_type),
            uuid.to_att_bytes(),
            AttPermissions::read_only(),
        )?;

        self.services.insert(
            handle,
            GattService {
                handle,
                uuid,
                is_primary,
                characteristics: Vec::new(),
                end_handle: handle,
            },
        );

        debug!("Added service {} at handle {}", uuid, handle);
        Ok(handle)
    }

    /// Add a characteristic to a service, returning its value handle
    ///
    /// Characteristics must be added to the most recently added service so that its
    /// handle range stays contiguous.
    pub fn add_characteristic(
        &mut self,
        service_handle: u16,
        uuid: Uuid,
        properties: CharacteristicProperty,
        permissions: AttPermissions,
        initial_value: Vec<u8>,
    ) -> AttResult<u16> {
        let last_service = self.services.keys().next_back().copied();
        if last_service != Some(service_handle) {
            return Err(AttError::InvalidParameter(format!(
                "Handle {} is not the open service",
                service_handle
            )));
        }

        let declaration_handle = self.database.next_handle()?;
        let value_handle = declaration_handle
            .checked_add(1)
            .ok_or(AttError::InsufficientResources)?;

        // Declaration value: properties, value handle, characteristic UUID
        let mut declaration_value = Vec::with_capacity(19);
        declaration_value.push(properties.bits());
        declaration_value
            .write_u16::<LittleEndian>(value_handle)
            .map_err(|e| AttError::InvalidParameter(e.to_string()))?;
        declaration_value.extend_from_slice(&uuid.to_att_bytes());

        self.database.add_attribute_with_next_handle(
            Uuid::from_u16(CHARACTERISTIC_UUID),
            declaration_value,
            AttPermissions::read_only(),
        )?;
        self.database
            .add_attribute_with_next_handle(uuid, initial_value, permissions)?;

        self.characteristics.insert(
            value_handle,
            GattCharacteristic {
                declaration_handle,
                value_handle,
                cccd_handle: None,
                uuid,
                properties,
            },
        );

        if let Some(service) = self.services.get_mut(&service_handle) {
            service.characteristics.push(value_handle);
            service.end_handle = value_handle;
        }

        debug!(
            "Added characteristic {} (value handle {}) to service {}",
            uuid, value_handle, service_handle
        );
        Ok(value_handle)
    }

    /// Add the standard Client Characteristic Configuration descriptor to a characteristic
    pub fn add_cccd(&mut self, value_handle: u16) -> AttResult<u16> {
        let characteristic = self
            .characteristics
            .get(&value_handle)
            .ok_or(AttError::AttributeNotFound)?;

        if !characteristic.properties.can_notify() && !characteristic.properties.can_indicate() {
            return Err(AttError::InvalidParameter(
                "Characteristic does not support notifications or indications".into(),
            ));
        }
        if characteristic.cccd_handle.is_some() {
            return Err(AttError::InvalidParameter(format!(
                "Characteristic {} already has a CCCD",
                value_handle
            )));
        }

        let handle = self.database.add_attribute_with_next_handle(
            Uuid::from_u16(CLIENT_CHAR_CONFIG_UUID),
            vec![0, 0], // Notifications and indications disabled by default
            AttPermissions::read_write(),
        )?;

        if let Some(characteristic) = self.characteristics.get_mut(&value_handle) {
            characteristic.cccd_handle = Some(handle);
        }
        self.cccds.insert(handle, value_handle);
        self.subscriptions.insert(value_handle, Subscription::empty());

        for service in self.services.values_mut() {
            if service.characteristics.contains(&value_handle) {
                service.end_handle = handle;
            }
        }

        Ok(handle)
    }

    /// Install a write authorization hook on a characteristic value
    pub fn set_write_authorizer(
        &mut self,
        value_handle: u16,
        authorizer: WriteAuthorizer,
    ) -> AttResult<()> {
        if !self.characteristics.contains_key(&value_handle) {
            return Err(AttError::AttributeNotFound);
        }
        self.database.register_write_authorizer(value_handle, authorizer)
    }

    /// Serve a peer read
    pub fn handle_read(&self, handle: u16) -> AttResult<Vec<u8>> {
        self.database.read_by_handle(handle)
    }

    /// Serve a peer write.
    ///
    /// Characteristic values go through their authorization hook; CCCD writes update the
    /// subscription for the owning characteristic.
    pub fn handle_write(&mut self, write: &PendingWrite) -> AttResult<WriteOutcome> {
        if let Some(&value_handle) = self.cccds.get(&write.handle) {
            return self.process_cccd_write(value_handle, write);
        }

        self.database.write_by_handle(write)?;
        Ok(WriteOutcome::Value {
            handle: write.handle,
            value: write.data.clone(),
        })
    }

    /// Process a write to a Client Characteristic Configuration descriptor
    fn process_cccd_write(
        &mut self,
        value_handle: u16,
        write: &PendingWrite,
    ) -> AttResult<WriteOutcome> {
        if write.offset != 0 {
            return Err(AttError::InvalidOffset(write.offset));
        }
        if write.len() != CCCD_VALUE_LEN {
            return Err(AttError::InvalidAttributeValueLength);
        }

        let flags = write
            .data
            .as_slice()
            .read_u16::<LittleEndian>()
            .map_err(|_| AttError::InvalidAttributeValueLength)?;
        let subscription = Subscription::from_bits_truncate(flags);

        let properties = self
            .characteristics
            .get(&value_handle)
            .map(|c| c.properties)
            .ok_or(AttError::AttributeNotFound)?;
        if (subscription.contains(Subscription::NOTIFY) && !properties.can_notify())
            || (subscription.contains(Subscription::INDICATE) && !properties.can_indicate())
        {
            return Err(AttError::Protocol(
                crate::att::AttErrorCode::CccdImproperlyConfigured,
                write.handle,
            ));
        }

        self.database.write_by_handle(write)?;
        self.subscriptions.insert(value_handle, subscription);
        info!(
            "Subscription on handle {} is now {:?}",
            value_handle, subscription
        );

        Ok(WriteOutcome::Subscription {
            value_handle,
            subscription,
        })
    }

    /// Current subscription state of a characteristic
    pub fn subscription(&self, value_handle: u16) -> Subscription {
        self.subscriptions
            .get(&value_handle)
            .copied()
            .unwrap_or_default()
    }

    /// Drop all subscriptions, e.g. after the peer disconnected
    pub fn clear_subscriptions(&mut self) {
        for subscription in self.subscriptions.values_mut() {
            *subscription = Subscription::empty();
        }
        let cccds: Vec<u16> = self.cccds.keys().copied().collect();
        for handle in cccds {
            // CCCD handles were allocated by this server
            let _ = self.database.set_value(handle, &[0, 0]);
        }
    }

    /// Update a characteristic value locally and queue notifications/indications for
    /// a subscribed client
    pub fn update_characteristic(&mut self, handle: u16, value: &[u8]) -> AttResult<()> {
        let properties = self
            .characteristics
            .get(&handle)
            .map(|c| c.properties)
            .ok_or(AttError::AttributeNotFound)?;

        self.database.set_value(handle, value)?;

        let subscription = self.subscription(handle);
        if subscription.contains(Subscription::NOTIFY) && properties.can_notify() {
            self.queue_update(handle, value, UpdateKind::Notification);
        }
        if subscription.contains(Subscription::INDICATE) && properties.can_indicate() {
            self.queue_update(handle, value, UpdateKind::Indication);
        }

        Ok(())
    }

    fn queue_update(&mut self, handle: u16, value: &[u8], kind: UpdateKind) {
        let max_payload = self.config.mtu.saturating_sub(3) as usize;
        if value.len() > max_payload {
            warn!(
                "Update for handle {} exceeds MTU payload ({} > {}), not sent",
                handle,
                value.len(),
                max_payload
            );
            return;
        }

        if self.outbound.len() >= self.config.max_pending_updates {
            if let Some(dropped) = self.outbound.pop_front() {
                warn!("Outbound queue full, dropping update for handle {}", dropped.handle);
            }
        }
        self.outbound.push_back(HandleValueUpdate {
            handle,
            value: value.to_vec(),
            kind,
        });
    }

    /// Take all queued updates for delivery by the radio stack
    pub fn drain_updates(&mut self) -> Vec<HandleValueUpdate> {
        self.outbound.drain(..).collect()
    }

    /// Get a characteristic value by handle
    pub fn get_characteristic_value(&self, handle: u16) -> AttResult<Vec<u8>> {
        if !self.characteristics.contains_key(&handle) {
            return Err(AttError::AttributeNotFound);
        }
        Ok(self.database.get_attribute(handle)?.value.clone())
    }

    /// Get all services
    pub fn get_services(&self) -> Vec<Service> {
        self.services
            .values()
            .map(|svc| Service {
                uuid: svc.uuid,
                is_primary: svc.is_primary,
                start_handle: svc.handle,
                end_handle: svc.end_handle,
            })
            .collect()
    }

    /// Get characteristics for a service
    pub fn get_characteristics(&self, service_handle: u16) -> AttResult<Vec<Characteristic>> {
        let service = self
            .services
            .get(&service_handle)
            .ok_or(AttError::AttributeNotFound)?;

        Ok(service
            .characteristics
            .iter()
            .filter_map(|handle| self.characteristics.get(handle))
            .map(|c| Characteristic {
                uuid: c.uuid,
                declaration_handle: c.declaration_handle,
                value_handle: c.value_handle,
                cccd_handle: c.cccd_handle,
                properties: c.properties,
            })
            .collect())
    }
}
