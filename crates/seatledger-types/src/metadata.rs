//! Descriptive ticket document published alongside each mint.
//!
//! The document is serialized canonically (fixed field order, no extra
//! whitespace) so that its SHA-256 can serve as a content address.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{SeatId, WalletAddress};

/// One `trait_type`/`value` pair in the attribute list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAttribute {
    pub trait_type: String,
    pub value: String,
}

impl MetadataAttribute {
    #[must_use]
    pub fn new(trait_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.into(),
            value: value.into(),
        }
    }
}

/// Token metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMetadata {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub attributes: Vec<MetadataAttribute>,
}

impl TicketMetadata {
    /// Build the document for a ticket being issued.
    #[must_use]
    pub fn for_ticket(
        event_title: &str,
        seat_id: &SeatId,
        holder_name: &str,
        holder_wallet: &WalletAddress,
        price: Decimal,
    ) -> Self {
        Self {
            name: format!("{event_title} Ticket"),
            description: format!(
                "Non-transferable ticket for {event_title}, seat {seat_id}, held by {holder_name} ({})",
                holder_wallet.short()
            ),
            image: None,
            attributes: vec![
                MetadataAttribute::new("Event", event_title),
                MetadataAttribute::new("Seat", seat_id.as_str()),
                MetadataAttribute::new("Holder", holder_name),
                MetadataAttribute::new("Price", price.normalize().to_string()),
            ],
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn to_canonical_json(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// SHA-256 over the canonical JSON encoding.
    pub fn content_hash(&self) -> crate::Result<[u8; 32]> {
        let bytes = self.to_canonical_json()?;
        Ok(Sha256::digest(&bytes).into())
    }

    pub fn content_hash_hex(&self) -> crate::Result<String> {
        Ok(hex::encode(self.content_hash()?))
    }

    #[must_use]
    pub fn attribute(&self, trait_type: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.trait_type == trait_type)
            .map(|a| a.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(price: Decimal) -> TicketMetadata {
        TicketMetadata::for_ticket(
            "Midnight Echoes",
            &SeatId::new("C-12"),
            "Ada",
            &WalletAddress::derived_from(b"ada"),
            price,
        )
    }

    #[test]
    fn document_shape() {
        let d = doc(Decimal::new(12_050, 2));
        assert_eq!(d.name, "Midnight Echoes Ticket");
        assert_eq!(d.attribute("Event"), Some("Midnight Echoes"));
        assert_eq!(d.attribute("Seat"), Some("C-12"));
        assert_eq!(d.attribute("Holder"), Some("Ada"));
        assert_eq!(d.attribute("Price"), Some("120.5"));
        assert!(d.attribute("Venue").is_none());
    }

    #[test]
    fn image_omitted_when_absent() {
        let json = String::from_utf8(doc(Decimal::ONE).to_canonical_json().unwrap()).unwrap();
        assert!(!json.contains("image"));
        let json = String::from_utf8(
            doc(Decimal::ONE)
                .with_image("ipfs://poster")
                .to_canonical_json()
                .unwrap(),
        )
        .unwrap();
        assert!(json.contains("ipfs://poster"));
    }

    #[test]
    fn content_hash_tracks_content() {
        let a = doc(Decimal::ONE);
        let b = doc(Decimal::ONE);
        let c = doc(Decimal::TWO);
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
        assert_ne!(a.content_hash().unwrap(), c.content_hash().unwrap());
        assert_eq!(a.content_hash_hex().unwrap().len(), 64);
    }
}
