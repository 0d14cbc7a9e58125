/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! SQLite query implementations.
//!
//! Mirrors [`postgres_dal`](super::postgres_dal) over BLOB ids and TEXT
//! timestamps. RFC3339 timestamps written by this crate share one offset
//! format, so lexical comparison on `created_at` orders them correctly.

pub mod models;

use diesel::prelude::*;

use self::models::{
    SqliteOutboxEvent, SqliteReporterRepresentation, SqliteReporterResource, SqliteResource,
};
use crate::dal::ResourceFilter;
use crate::database::schema::sqlite::{
    outbox_events, reporter_representations, reporter_resources, resources,
};
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::StorageError;
use crate::models::outbox_event::{NewOutboxEvent, OutboxEvent};
use crate::models::resource::{
    ReporterRepresentation, ReporterResource, ReporterResourceKey, Resource, ResourceSnapshot,
};

pub fn find_by_key(
    conn: &mut SqliteConnection,
    key: &ReporterResourceKey,
) -> Result<Option<ResourceSnapshot>, StorageError> {
    let row = reporter_resources::table
        .inner_join(resources::table)
        .filter(reporter_resources::local_resource_id.eq(&key.local_resource_id))
        .filter(reporter_resources::reporter_type.eq(&key.reporter_type))
        .filter(reporter_resources::resource_type.eq(&key.resource_type))
        .filter(reporter_resources::reporter_instance_id.eq(&key.reporter_instance_id))
        .select((SqliteReporterResource::as_select(), SqliteResource::as_select()))
        .first::<(SqliteReporterResource, SqliteResource)>(conn)
        .optional()?;

    row.map(|(reporter_resource, resource)| {
        Ok(ResourceSnapshot {
            resource: resource.try_into()?,
            reporter_resource: reporter_resource.try_into()?,
        })
    })
    .transpose()
}

pub fn insert_resource(
    conn: &mut SqliteConnection,
    resource: &Resource,
) -> Result<(), StorageError> {
    diesel::insert_into(resources::table)
        .values(SqliteResource::from(resource))
        .execute(conn)?;
    Ok(())
}

pub fn update_resource(
    conn: &mut SqliteConnection,
    resource: &Resource,
) -> Result<(), StorageError> {
    diesel::update(resources::table.find(resource.id.as_bytes().to_vec()))
        .set((
            resources::common_version.eq(resource.common_version),
            resources::workspace_id.eq(&resource.workspace_id),
            resources::updated_at.eq(resource.updated_at.to_rfc3339()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn insert_reporter_resource(
    conn: &mut SqliteConnection,
    reporter_resource: &ReporterResource,
) -> Result<(), StorageError> {
    diesel::insert_into(reporter_resources::table)
        .values(SqliteReporterResource::from(reporter_resource))
        .execute(conn)?;
    Ok(())
}

pub fn update_reporter_resource(
    conn: &mut SqliteConnection,
    reporter_resource: &ReporterResource,
) -> Result<(), StorageError> {
    diesel::update(reporter_resources::table.find(reporter_resource.id.as_bytes().to_vec()))
        .set((
            reporter_resources::api_href.eq(&reporter_resource.api_href),
            reporter_resources::console_href.eq(&reporter_resource.console_href),
            reporter_resources::representation_version
                .eq(reporter_resource.representation_version),
            reporter_resources::tombstone.eq(reporter_resource.tombstone),
            reporter_resources::updated_at.eq(reporter_resource.updated_at.to_rfc3339()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn insert_representation(
    conn: &mut SqliteConnection,
    representation: &ReporterRepresentation,
) -> Result<(), StorageError> {
    diesel::insert_into(reporter_representations::table)
        .values(SqliteReporterRepresentation::try_from(representation)?)
        .execute(conn)?;
    Ok(())
}

pub fn latest_representation(
    conn: &mut SqliteConnection,
    reporter_resource_id: UniversalUuid,
) -> Result<Option<ReporterRepresentation>, StorageError> {
    let row = reporter_representations::table
        .filter(
            reporter_representations::reporter_resource_id
                .eq(reporter_resource_id.as_bytes().to_vec()),
        )
        .order(reporter_representations::version.desc())
        .select(SqliteReporterRepresentation::as_select())
        .first(conn)
        .optional()?;
    row.map(ReporterRepresentation::try_from).transpose()
}

pub fn transaction_id_exists(
    conn: &mut SqliteConnection,
    txid: &str,
) -> Result<bool, StorageError> {
    let found = diesel::select(diesel::dsl::exists(
        reporter_representations::table
            .filter(reporter_representations::transaction_id.eq(txid)),
    ))
    .get_result::<bool>(conn)?;
    Ok(found)
}

pub fn set_consistency_token(
    conn: &mut SqliteConnection,
    resource_id: UniversalUuid,
    token: &str,
) -> Result<usize, StorageError> {
    let updated = diesel::update(resources::table.find(resource_id.as_bytes().to_vec()))
        .set(resources::consistency_token.eq(token))
        .execute(conn)?;
    Ok(updated)
}

pub fn insert_outbox_event(
    conn: &mut SqliteConnection,
    event: &NewOutboxEvent,
) -> Result<(), StorageError> {
    diesel::insert_into(outbox_events::table)
        .values(SqliteOutboxEvent::try_from(event)?)
        .execute(conn)?;
    Ok(())
}

pub fn list_outbox_events(
    conn: &mut SqliteConnection,
    limit: i64,
) -> Result<Vec<OutboxEvent>, StorageError> {
    outbox_events::table
        .order(outbox_events::id.asc())
        .limit(limit)
        .select(SqliteOutboxEvent::as_select())
        .load::<SqliteOutboxEvent>(conn)?
        .into_iter()
        .map(OutboxEvent::try_from)
        .collect()
}

pub fn count_outbox_older_than(
    conn: &mut SqliteConnection,
    cutoff: UniversalTimestamp,
) -> Result<i64, StorageError> {
    let count = outbox_events::table
        .filter(outbox_events::created_at.lt(cutoff.to_rfc3339()))
        .count()
        .get_result(conn)?;
    Ok(count)
}

pub fn delete_outbox_batch_older_than(
    conn: &mut SqliteConnection,
    cutoff: UniversalTimestamp,
    batch_size: i64,
) -> Result<usize, StorageError> {
    let ids: Vec<Vec<u8>> = outbox_events::table
        .filter(outbox_events::created_at.lt(cutoff.to_rfc3339()))
        .order(outbox_events::created_at.asc())
        .limit(batch_size)
        .select(outbox_events::id)
        .load(conn)?;

    if ids.is_empty() {
        return Ok(0);
    }

    let deleted = diesel::delete(outbox_events::table.filter(outbox_events::id.eq_any(ids)))
        .execute(conn)?;
    Ok(deleted)
}

pub fn count_resources(
    conn: &mut SqliteConnection,
    filter: &ResourceFilter,
) -> Result<i64, StorageError> {
    let count = reporter_resources::table
        .filter(reporter_resources::resource_type.eq(&filter.resource_type))
        .filter(reporter_resources::reporter_type.eq(&filter.reporter_type))
        .count()
        .get_result(conn)?;
    Ok(count)
}

pub fn delete_resources_batch(
    conn: &mut SqliteConnection,
    filter: &ResourceFilter,
    batch_size: i64,
) -> Result<usize, StorageError> {
    let rows: Vec<(Vec<u8>, Vec<u8>)> = reporter_resources::table
        .filter(reporter_resources::resource_type.eq(&filter.resource_type))
        .filter(reporter_resources::reporter_type.eq(&filter.reporter_type))
        .limit(batch_size)
        .select((reporter_resources::id, reporter_resources::resource_id))
        .load(conn)?;

    if rows.is_empty() {
        return Ok(0);
    }

    let (reporter_ids, resource_ids): (Vec<Vec<u8>>, Vec<Vec<u8>>) = rows.into_iter().unzip();

    diesel::delete(
        reporter_representations::table
            .filter(reporter_representations::reporter_resource_id.eq_any(&reporter_ids)),
    )
    .execute(conn)?;
    let deleted = diesel::delete(
        reporter_resources::table.filter(reporter_resources::id.eq_any(&reporter_ids)),
    )
    .execute(conn)?;
    diesel::delete(resources::table.filter(resources::id.eq_any(&resource_ids))).execute(conn)?;

    Ok(deleted)
}
