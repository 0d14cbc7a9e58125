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

//! PostgreSQL query implementations.
//!
//! Every function takes a plain connection so it can run either inside a
//! transaction attempt of the [`TransactionManager`](super::TransactionManager)
//! or on a pooled connection via `interact`.

pub mod models;

use diesel::prelude::*;
use uuid::Uuid;

use self::models::{
    NewPgOutboxEvent, PgOutboxEvent, PgReporterRepresentation, PgReporterResource, PgResource,
};
use crate::dal::ResourceFilter;
use crate::database::schema::postgres::{
    outbox_events, reporter_representations, reporter_resources, resources,
};
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::StorageError;
use crate::models::outbox_event::{NewOutboxEvent, OutboxEvent};
use crate::models::resource::{
    ReporterRepresentation, ReporterResource, ReporterResourceKey, Resource, ResourceSnapshot,
};

pub fn find_by_key(
    conn: &mut PgConnection,
    key: &ReporterResourceKey,
) -> Result<Option<ResourceSnapshot>, StorageError> {
    let row = reporter_resources::table
        .inner_join(resources::table)
        .filter(reporter_resources::local_resource_id.eq(&key.local_resource_id))
        .filter(reporter_resources::reporter_type.eq(&key.reporter_type))
        .filter(reporter_resources::resource_type.eq(&key.resource_type))
        .filter(reporter_resources::reporter_instance_id.eq(&key.reporter_instance_id))
        .select((PgReporterResource::as_select(), PgResource::as_select()))
        .first::<(PgReporterResource, PgResource)>(conn)
        .optional()?;

    Ok(row.map(|(reporter_resource, resource)| ResourceSnapshot {
        resource: resource.into(),
        reporter_resource: reporter_resource.into(),
    }))
}

pub fn insert_resource(conn: &mut PgConnection, resource: &Resource) -> Result<(), StorageError> {
    diesel::insert_into(resources::table)
        .values(PgResource::from(resource))
        .execute(conn)?;
    Ok(())
}

pub fn update_resource(conn: &mut PgConnection, resource: &Resource) -> Result<(), StorageError> {
    diesel::update(resources::table.find(resource.id.as_uuid()))
        .set((
            resources::common_version.eq(resource.common_version),
            resources::workspace_id.eq(&resource.workspace_id),
            resources::updated_at.eq(resource.updated_at.to_naive()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn insert_reporter_resource(
    conn: &mut PgConnection,
    reporter_resource: &ReporterResource,
) -> Result<(), StorageError> {
    diesel::insert_into(reporter_resources::table)
        .values(PgReporterResource::from(reporter_resource))
        .execute(conn)?;
    Ok(())
}

pub fn update_reporter_resource(
    conn: &mut PgConnection,
    reporter_resource: &ReporterResource,
) -> Result<(), StorageError> {
    diesel::update(reporter_resources::table.find(reporter_resource.id.as_uuid()))
        .set((
            reporter_resources::api_href.eq(&reporter_resource.api_href),
            reporter_resources::console_href.eq(&reporter_resource.console_href),
            reporter_resources::representation_version
                .eq(reporter_resource.representation_version),
            reporter_resources::tombstone.eq(reporter_resource.tombstone),
            reporter_resources::updated_at.eq(reporter_resource.updated_at.to_naive()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn insert_representation(
    conn: &mut PgConnection,
    representation: &ReporterRepresentation,
) -> Result<(), StorageError> {
    diesel::insert_into(reporter_representations::table)
        .values(PgReporterRepresentation::from(representation))
        .execute(conn)?;
    Ok(())
}

pub fn latest_representation(
    conn: &mut PgConnection,
    reporter_resource_id: UniversalUuid,
) -> Result<Option<ReporterRepresentation>, StorageError> {
    let row = reporter_representations::table
        .filter(reporter_representations::reporter_resource_id.eq(reporter_resource_id.as_uuid()))
        .order(reporter_representations::version.desc())
        .select(PgReporterRepresentation::as_select())
        .first(conn)
        .optional()?;
    Ok(row.map(Into::into))
}

pub fn transaction_id_exists(conn: &mut PgConnection, txid: &str) -> Result<bool, StorageError> {
    let found = diesel::select(diesel::dsl::exists(
        reporter_representations::table
            .filter(reporter_representations::transaction_id.eq(txid)),
    ))
    .get_result::<bool>(conn)?;
    Ok(found)
}

pub fn set_consistency_token(
    conn: &mut PgConnection,
    resource_id: UniversalUuid,
    token: &str,
) -> Result<usize, StorageError> {
    let updated = diesel::update(resources::table.find(resource_id.as_uuid()))
        .set(resources::consistency_token.eq(token))
        .execute(conn)?;
    Ok(updated)
}

pub fn insert_outbox_event(
    conn: &mut PgConnection,
    event: &NewOutboxEvent,
) -> Result<(), StorageError> {
    diesel::insert_into(outbox_events::table)
        .values(NewPgOutboxEvent::from(event))
        .execute(conn)?;
    Ok(())
}

pub fn list_outbox_events(
    conn: &mut PgConnection,
    limit: i64,
) -> Result<Vec<OutboxEvent>, StorageError> {
    outbox_events::table
        .order(outbox_events::id.asc())
        .limit(limit)
        .select(PgOutboxEvent::as_select())
        .load::<PgOutboxEvent>(conn)?
        .into_iter()
        .map(OutboxEvent::try_from)
        .collect()
}

pub fn count_outbox_older_than(
    conn: &mut PgConnection,
    cutoff: UniversalTimestamp,
) -> Result<i64, StorageError> {
    let count = outbox_events::table
        .filter(outbox_events::created_at.lt(cutoff.to_naive()))
        .count()
        .get_result(conn)?;
    Ok(count)
}

pub fn delete_outbox_batch_older_than(
    conn: &mut PgConnection,
    cutoff: UniversalTimestamp,
    batch_size: i64,
) -> Result<usize, StorageError> {
    let ids: Vec<Uuid> = outbox_events::table
        .filter(outbox_events::created_at.lt(cutoff.to_naive()))
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
    conn: &mut PgConnection,
    filter: &ResourceFilter,
) -> Result<i64, StorageError> {
    let count = reporter_resources::table
        .filter(reporter_resources::resource_type.eq(&filter.resource_type))
        .filter(reporter_resources::reporter_type.eq(&filter.reporter_type))
        .count()
        .get_result(conn)?;
    Ok(count)
}

/// Deletes up to `batch_size` resources reported by the filter's reporter,
/// along with their reporter rows and representation history.
///
/// Each resource row is owned by exactly one reporter row, so the parent
/// resource goes with it.
pub fn delete_resources_batch(
    conn: &mut PgConnection,
    filter: &ResourceFilter,
    batch_size: i64,
) -> Result<usize, StorageError> {
    let rows: Vec<(Uuid, Uuid)> = reporter_resources::table
        .filter(reporter_resources::resource_type.eq(&filter.resource_type))
        .filter(reporter_resources::reporter_type.eq(&filter.reporter_type))
        .limit(batch_size)
        .select((reporter_resources::id, reporter_resources::resource_id))
        .load(conn)?;

    if rows.is_empty() {
        return Ok(0);
    }

    let (reporter_ids, resource_ids): (Vec<Uuid>, Vec<Uuid>) = rows.into_iter().unzip();

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
