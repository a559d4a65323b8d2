use agora_core::Platform;
use agora_core::canonical::CanonicalVenue;
use agora_core::id::VenueId;
use redb_bincode::ReadTransaction;

use crate::{
    Database, DbResult, VenueRecord, WriteTransactionCtx, venues, venues_by_platform,
};

impl Database {
    /// Insert-or-reuse by `(platform, platform_venue_id)`.
    ///
    /// Online venues all collapse onto the platform's shared `"online"` row.
    /// Existing rows are refreshed with the latest upstream fields.
    pub fn upsert_venue_tx(
        tx: &WriteTransactionCtx,
        platform: Platform,
        venue: &CanonicalVenue,
    ) -> DbResult<VenueId> {
        let record = if venue.is_online {
            VenueRecord::from_canonical(platform, &CanonicalVenue::online())
        } else {
            VenueRecord::from_canonical(platform, venue)
        };

        let mut by_platform = tx.open_table(&venues_by_platform::TABLE)?;
        let mut venues_table = tx.open_table(&venues::TABLE)?;

        let index_key = (platform, record.platform_venue_id.clone());
        if let Some(existing) = by_platform.get(&index_key)?.map(|g| g.value()) {
            venues_table.insert(&existing, &record)?;
            return Ok(existing);
        }

        let venue_id = VenueId::random();
        venues_table.insert(&venue_id, &record)?;
        by_platform.insert(&index_key, &venue_id)?;
        Ok(venue_id)
    }

    pub fn get_venue_tx(tx: &ReadTransaction, venue_id: VenueId) -> DbResult<Option<VenueRecord>> {
        Ok(tx
            .open_table(&venues::TABLE)?
            .get(&venue_id)?
            .map(|g| g.value()))
    }

    pub async fn get_venue(&self, venue_id: VenueId) -> DbResult<Option<VenueRecord>> {
        self.read_with(|tx| Self::get_venue_tx(tx, venue_id)).await
    }
}
