use diesel::prelude::*;

use crate::models::{NewPlant, PlantChanges, PlantRow};
use crate::schema::plants;

/// Where a generated image URL ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageUpsert {
    Updated(i32),
    Inserted(i32),
}

/// Run query using Diesel to load every plant, newest first.
pub fn list_plants(conn: &mut SqliteConnection) -> QueryResult<Vec<PlantRow>> {
    use crate::schema::plants::dsl::*;

    plants
        .order(id.desc())
        .select(PlantRow::as_select())
        .load(conn)
}

/// Run query using Diesel to find plant by id and return it.
pub fn find_plant_by_id(conn: &mut SqliteConnection, plant_id: i32) -> QueryResult<Option<PlantRow>> {
    use crate::schema::plants::dsl::*;

    plants
        .find(plant_id)
        .select(PlantRow::as_select())
        .first(conn)
        .optional()
}

/// Run query using Diesel to insert a new database row and return its id.
pub fn insert_new_plant(conn: &mut SqliteConnection, new_plant: &NewPlant) -> QueryResult<i32> {
    diesel::insert_into(plants::table)
        .values(new_plant)
        .returning(plants::id)
        .get_result(conn)
}

/// Apply the supplied fields to one plant. Returns the affected row count.
pub fn update_plant(
    conn: &mut SqliteConnection,
    plant_id: i32,
    changes: &PlantChanges,
) -> QueryResult<usize> {
    // diesel refuses an UPDATE with an empty SET list
    if changes.is_empty() {
        return Ok(0);
    }

    diesel::update(plants::table.find(plant_id))
        .set(changes)
        .execute(conn)
}

pub fn delete_plant(conn: &mut SqliteConnection, plant_id: i32) -> QueryResult<usize> {
    diesel::delete(plants::table.find(plant_id)).execute(conn)
}

/// Oldest non-empty image URL stored under the lookup key `key`.
pub fn find_cached_image(conn: &mut SqliteConnection, key: &str) -> QueryResult<Option<String>> {
    use crate::schema::plants::dsl::*;

    let url = plants
        .filter(name_key.eq(key))
        .filter(image_url.is_not_null())
        .filter(image_url.ne(""))
        .order(id.asc())
        .select(image_url)
        .first::<Option<String>>(conn)
        .optional()?;

    Ok(url.flatten())
}

/// Point the oldest row whose lookup key is `key` at `url`, or create a row
/// holding just the key as its name and the URL.
pub fn upsert_plant_image(conn: &mut SqliteConnection, key: &str, url: &str) -> QueryResult<ImageUpsert> {
    use crate::schema::plants::dsl::*;

    conn.immediate_transaction(|conn| {
        let existing = plants
            .filter(name_key.eq(key))
            .order(id.asc())
            .select(id)
            .first::<i32>(conn)
            .optional()?;

        match existing {
            Some(plant_id) => {
                diesel::update(plants.find(plant_id))
                    .set(image_url.eq(url))
                    .execute(conn)?;
                Ok(ImageUpsert::Updated(plant_id))
            }
            None => {
                let plant_id = diesel::insert_into(plants)
                    .values((name.eq(key), name_key.eq(key), image_url.eq(url)))
                    .returning(id)
                    .get_result(conn)?;
                Ok(ImageUpsert::Inserted(plant_id))
            }
        }
    })
}
