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

//! Diesel table definitions, one module per backend.
//!
//! The two modules describe the same logical tables; only the column SQL
//! types differ.

#[cfg(feature = "postgres")]
pub mod postgres {
    diesel::table! {
        resources (id) {
            id -> Uuid,
            resource_type -> Varchar,
            common_version -> Int8,
            workspace_id -> Varchar,
            consistency_token -> Nullable<Varchar>,
            created_at -> Timestamp,
            updated_at -> Timestamp,
        }
    }

    diesel::table! {
        reporter_resources (id) {
            id -> Uuid,
            resource_id -> Uuid,
            local_resource_id -> Varchar,
            reporter_type -> Varchar,
            resource_type -> Varchar,
            reporter_instance_id -> Varchar,
            api_href -> Varchar,
            console_href -> Nullable<Varchar>,
            representation_version -> Int8,
            tombstone -> Bool,
            created_at -> Timestamp,
            updated_at -> Timestamp,
        }
    }

    diesel::table! {
        reporter_representations (reporter_resource_id, version) {
            reporter_resource_id -> Uuid,
            version -> Int8,
            data -> Jsonb,
            common_version -> Int8,
            transaction_id -> Nullable<Varchar>,
            tombstone -> Bool,
            created_at -> Timestamp,
        }
    }

    diesel::table! {
        outbox_events (id) {
            id -> Uuid,
            aggregatetype -> Varchar,
            aggregateid -> Varchar,
            operation -> Varchar,
            txid -> Nullable<Varchar>,
            payload -> Jsonb,
            created_at -> Timestamp,
        }
    }

    diesel::joinable!(reporter_resources -> resources (resource_id));
    diesel::joinable!(reporter_representations -> reporter_resources (reporter_resource_id));
    diesel::allow_tables_to_appear_in_same_query!(
        resources,
        reporter_resources,
        reporter_representations,
        outbox_events,
    );
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    diesel::table! {
        resources (id) {
            id -> Binary,
            resource_type -> Text,
            common_version -> BigInt,
            workspace_id -> Text,
            consistency_token -> Nullable<Text>,
            created_at -> Text,
            updated_at -> Text,
        }
    }

    diesel::table! {
        reporter_resources (id) {
            id -> Binary,
            resource_id -> Binary,
            local_resource_id -> Text,
            reporter_type -> Text,
            resource_type -> Text,
            reporter_instance_id -> Text,
            api_href -> Text,
            console_href -> Nullable<Text>,
            representation_version -> BigInt,
            tombstone -> Bool,
            created_at -> Text,
            updated_at -> Text,
        }
    }

    diesel::table! {
        reporter_representations (reporter_resource_id, version) {
            reporter_resource_id -> Binary,
            version -> BigInt,
            data -> Text,
            common_version -> BigInt,
            transaction_id -> Nullable<Text>,
            tombstone -> Bool,
            created_at -> Text,
        }
    }

    diesel::table! {
        outbox_events (id) {
            id -> Binary,
            aggregatetype -> Text,
            aggregateid -> Text,
            operation -> Text,
            txid -> Nullable<Text>,
            payload -> Text,
            created_at -> Text,
        }
    }

    diesel::joinable!(reporter_resources -> resources (resource_id));
    diesel::joinable!(reporter_representations -> reporter_resources (reporter_resource_id));
    diesel::allow_tables_to_appear_in_same_query!(
        resources,
        reporter_resources,
        reporter_representations,
        outbox_events,
    );
}
