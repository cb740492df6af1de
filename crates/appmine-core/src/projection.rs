//! Per-query field allowlists for [`Entry`] records.
//!
//! Every read that exposes entries to a report builds its own
//! [`EntryProjection`]; fields outside the allowlist are cleared before the
//! record leaves the store.

use std::collections::BTreeSet;

use crate::types::Entry;

/// Optional fields of an [`Entry`]. `id` and `name` are always visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryField {
    Website,
    BtcAddress,
    StxAddress,
    Slug,
    Blockchain,
    StorageNetwork,
    Authentication,
    Category,
    ContactEmail,
    AccessToken,
    Notes,
    Status,
}

impl EntryField {
    /// Fields any public report may show.
    pub const PUBLIC: [EntryField; 6] = [
        Self::Website,
        Self::Slug,
        Self::Blockchain,
        Self::StorageNetwork,
        Self::Authentication,
        Self::Category,
    ];
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryProjection {
    fields: BTreeSet<EntryField>,
}

impl EntryProjection {
    /// Public fields only; payout addresses and contact data are hidden.
    pub fn public() -> Self {
        Self {
            fields: EntryField::PUBLIC.into_iter().collect(),
        }
    }

    /// No field hidden.
    pub fn all() -> Self {
        Self::public()
            .with(EntryField::BtcAddress)
            .with(EntryField::StxAddress)
            .with(EntryField::ContactEmail)
            .with(EntryField::AccessToken)
            .with(EntryField::Notes)
            .with(EntryField::Status)
    }

    pub fn with(mut self, field: EntryField) -> Self {
        self.fields.insert(field);
        self
    }

    pub fn allows(&self, field: EntryField) -> bool {
        self.fields.contains(&field)
    }
}

impl Entry {
    /// Copy of this entry with every field outside `projection` cleared.
    pub fn project(&self, projection: &EntryProjection) -> Entry {
        let keep = |field: EntryField, value: &Option<String>| {
            if projection.allows(field) {
                value.clone()
            } else {
                None
            }
        };
        Entry {
            id: self.id,
            name: self.name.clone(),
            website: keep(EntryField::Website, &self.website),
            btc_address: keep(EntryField::BtcAddress, &self.btc_address),
            stx_address: keep(EntryField::StxAddress, &self.stx_address),
            slug: keep(EntryField::Slug, &self.slug),
            blockchain: keep(EntryField::Blockchain, &self.blockchain),
            storage_network: keep(EntryField::StorageNetwork, &self.storage_network),
            authentication: keep(EntryField::Authentication, &self.authentication),
            category: keep(EntryField::Category, &self.category),
            contact_email: keep(EntryField::ContactEmail, &self.contact_email),
            access_token: keep(EntryField::AccessToken, &self.access_token),
            notes: keep(EntryField::Notes, &self.notes),
            status: keep(EntryField::Status, &self.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryId;

    fn full_entry() -> Entry {
        Entry {
            id: EntryId(1),
            name: "Graphite".into(),
            website: Some("https://graphitedocs.com".into()),
            btc_address: Some("1Graphite".into()),
            stx_address: Some("SP2GRAPHITE".into()),
            slug: Some("graphite".into()),
            blockchain: Some("Bitcoin".into()),
            storage_network: Some("Gaia".into()),
            authentication: Some("Blockstack".into()),
            category: Some("Productivity".into()),
            contact_email: Some("team@graphitedocs.com".into()),
            access_token: Some("secret".into()),
            notes: Some("internal".into()),
            status: Some("accepted".into()),
        }
    }

    #[test]
    fn public_projection_hides_private_fields() {
        let projected = full_entry().project(&EntryProjection::public());
        assert_eq!(projected.name, "Graphite");
        assert_eq!(projected.slug.as_deref(), Some("graphite"));
        assert!(projected.btc_address.is_none());
        assert!(projected.contact_email.is_none());
        assert!(projected.access_token.is_none());
        assert!(projected.notes.is_none());
    }

    #[test]
    fn extending_one_projection_leaves_others_untouched() {
        let with_btc = EntryProjection::public().with(EntryField::BtcAddress);
        let public = EntryProjection::public();

        assert_eq!(
            full_entry().project(&with_btc).btc_address.as_deref(),
            Some("1Graphite")
        );
        assert!(full_entry().project(&public).btc_address.is_none());
        assert!(!public.allows(EntryField::BtcAddress));
    }

    #[test]
    fn all_projection_is_identity() {
        let entry = full_entry();
        assert_eq!(entry.project(&EntryProjection::all()), entry);
    }
}
