//! Writes to and reads from the `daily` table.

use diesel::{prelude::*, upsert::excluded};

use crate::{error::ImportError, models::ShortVolumeRow, schema::daily};

/// Writes `rows` in one immediate transaction and returns how many were
/// written. A row for an existing (day, ticker) replaces the stored volumes,
/// so importing the same day twice leaves one copy. On any failure nothing is
/// written.
pub fn insert_rows(
    conn: &mut SqliteConnection,
    rows: &[ShortVolumeRow],
) -> Result<usize, ImportError> {
    let written = conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
        let mut written = 0;
        for row in rows {
            written += diesel::insert_into(daily::table)
                .values(row)
                .on_conflict((daily::day, daily::ticker))
                .do_update()
                .set((
                    daily::dp_buy_volume.eq(excluded(daily::dp_buy_volume)),
                    daily::dp_sell_volume.eq(excluded(daily::dp_sell_volume)),
                    daily::dp_volume_rate.eq(excluded(daily::dp_volume_rate)),
                ))
                .execute(conn)?;
        }
        Ok(written)
    })?;
    Ok(written)
}

/// All rows stored for `day` (`YYYY-MM-DD`), by ticker.
pub fn rows_for_day(conn: &mut SqliteConnection, day: &str) -> QueryResult<Vec<ShortVolumeRow>> {
    daily::table
        .filter(daily::day.eq(day))
        .order(daily::ticker.asc())
        .select(ShortVolumeRow::as_select())
        .load(conn)
}
