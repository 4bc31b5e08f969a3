//! The persisted committee descriptor.
//!
//! `BootupData` is the minimum record needed to load a committee for one
//! smart contract: the contract address, the owner address, the token
//! color, and the ordered committee / access node lists. It is written
//! once when the committee is set up and read at every boot. Authorization
//! for creating or updating the record is the node's concern, not the
//! contract's.
//!
//! Byte layout (all integers big-endian):
//!
//! ```text
//! address[20] ‖ owner_address[20] ‖ color[32]
//!   ‖ u16 committee_count ‖ (u16 len ‖ utf8)*
//!   ‖ u16 access_count    ‖ (u16 len ‖ utf8)*
//! ```

use {
    crate::{
        codec::{write_strings, Reader},
        error::{RegistryError, Result},
        keys::{bootup_key, ObjectType},
        kvstore::KvStore,
    },
    log::warn,
    synod_monitoring::Publisher,
    synod_types::{Address, Color, ADDRESS_LEN, COLOR_LEN},
};

/// The committee descriptor. Immutable at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootupData {
    /// Contract address the committee operates.
    pub address: Address,
    /// Owner address; receives rewards and signs administrative requests.
    pub owner_address: Address,
    /// Token color of the committee. Also identifies the origin transaction.
    pub color: Color,
    /// Ordered peering ids (`host:port`) of the committee nodes.
    pub committee_nodes: Vec<String>,
    /// Ordered peering ids of the access nodes.
    pub access_nodes: Vec<String>,
}

impl BootupData {
    /// Committee size.
    pub fn size(&self) -> u16 {
        self.committee_nodes.len() as u16
    }

    /// Index of `peering_id` in the committee list, if it is a member.
    pub fn peer_index_of(&self, peering_id: &str) -> Option<u16> {
        self.committee_nodes
            .iter()
            .position(|id| id == peering_id)
            .map(|i| i as u16)
    }

    /// Validate the record before saving or after loading.
    pub fn validate(&self) -> Result<()> {
        if self.address.is_zero() {
            return Err(RegistryError::InvalidRecord("zero contract address".into()));
        }
        if !self.color.is_valid_committee_color() {
            return Err(RegistryError::InvalidRecord(
                "color must not be the placeholder or the reserved base-token color".into(),
            ));
        }
        if self.committee_nodes.is_empty() {
            return Err(RegistryError::InvalidRecord("empty committee".into()));
        }
        for (i, id) in self.committee_nodes.iter().enumerate() {
            if self.committee_nodes[i + 1..].contains(id) {
                return Err(RegistryError::InvalidRecord(format!(
                    "duplicate committee node {id}"
                )));
            }
        }
        Ok(())
    }

    /// Encode into the persisted byte layout.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(self.address.as_ref());
        out.extend_from_slice(self.owner_address.as_ref());
        out.extend_from_slice(self.color.as_ref());
        write_strings(&mut out, &self.committee_nodes)?;
        write_strings(&mut out, &self.access_nodes)?;
        Ok(out)
    }

    /// Decode from the persisted byte layout.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let address = Address::from_slice(reader.read_bytes(ADDRESS_LEN)?)
            .ok_or_else(|| RegistryError::Corrupted("bad address".into()))?;
        let owner_address = Address::from_slice(reader.read_bytes(ADDRESS_LEN)?)
            .ok_or_else(|| RegistryError::Corrupted("bad owner address".into()))?;
        let color = Color::from_slice(reader.read_bytes(COLOR_LEN)?)
            .ok_or_else(|| RegistryError::Corrupted("bad color".into()))?;
        let committee_nodes = reader.read_strings()?;
        let access_nodes = reader.read_strings()?;
        if reader.remaining() != 0 {
            return Err(RegistryError::Corrupted(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }
        Ok(Self {
            address,
            owner_address,
            color,
            committee_nodes,
            access_nodes,
        })
    }
}

/// Save a committee descriptor. Refuses to overwrite an existing record
/// for the same address. Publishes `bootuprec` on success.
pub fn save_bootup_data(
    store: &dyn KvStore,
    publisher: &Publisher,
    bd: &BootupData,
) -> Result<()> {
    bd.validate()?;

    let key = bootup_key(&bd.address);
    if store.has(&key)? {
        return Err(RegistryError::AlreadyExists(bd.address.to_string()));
    }
    store.set(&key, &bd.encode()?)?;

    publisher.publish(
        "bootuprec",
        &[&bd.address.to_string(), &bd.color.to_string()],
    );
    Ok(())
}

/// Load the committee descriptor for `address`, `None` if absent.
pub fn load_bootup_data(store: &dyn KvStore, address: &Address) -> Result<Option<BootupData>> {
    match store.get(&bootup_key(address))? {
        Some(data) => Ok(Some(BootupData::decode(&data)?)),
        None => Ok(None),
    }
}

/// List every committee descriptor in the store, skipping corrupt records
/// with a warning.
pub fn bootup_records(store: &dyn KvStore) -> Result<Vec<BootupData>> {
    let mut out = Vec::new();
    store.iterate_prefix(&[ObjectType::BootupData as u8], &mut |key, value| {
        match BootupData::decode(value) {
            Ok(bd) => out.push(bd),
            Err(e) => warn!("corrupted bootup record at key {key:02x?}: {e}"),
        }
        true
    })?;
    Ok(out)
}
