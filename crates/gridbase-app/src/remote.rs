// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Asynchronous calls issued by the grid. A runtime executes a
//! [`RemoteRequest`] wherever it likes and feeds the [`RemoteReply`] back into
//! the UI state machine as an event.

use crate::api::{RecordPage, RecordService, TableDetail};
use crate::cache::{FetchTicket, StructureTicket};
use crate::error::ApiResult;
use crate::ids::TableId;
use crate::protocol::{MutationId, MutationKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    FetchPage(FetchTicket),
    LoadStructure(StructureTicket),
    Mutate {
        id: MutationId,
        table: TableId,
        kind: MutationKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteReply {
    Page {
        ticket: FetchTicket,
        result: ApiResult<RecordPage>,
    },
    Structure {
        ticket: StructureTicket,
        result: ApiResult<TableDetail>,
    },
    Mutation {
        id: MutationId,
        result: ApiResult<String>,
    },
}

pub fn execute<S: RecordService + ?Sized>(service: &S, request: RemoteRequest) -> RemoteReply {
    match request {
        RemoteRequest::FetchPage(ticket) => RemoteReply::Page {
            ticket,
            result: service.get_records_page(ticket.table, ticket.query),
        },
        RemoteRequest::LoadStructure(ticket) => RemoteReply::Structure {
            ticket,
            result: service.get_table(ticket.table),
        },
        RemoteRequest::Mutate { id, table, kind } => RemoteReply::Mutation {
            id,
            result: run_mutation(service, table, kind),
        },
    }
}

fn run_mutation<S: RecordService + ?Sized>(
    service: &S,
    table: TableId,
    kind: MutationKind,
) -> ApiResult<String> {
    match kind {
        MutationKind::UpdateValue {
            record,
            field,
            value,
        } => service
            .update_record_field(record, field, value)
            .map(|_| "saved".to_owned()),
        MutationKind::DeleteRecords { records } => {
            let deleted = service.delete_records(table, &records)?;
            Ok(match deleted {
                1 => "deleted 1 record".to_owned(),
                n => format!("deleted {n} records"),
            })
        }
        MutationKind::DeleteField { field } => service
            .delete_field(field)
            .map(|()| "field deleted".to_owned()),
        MutationKind::CreateRecord { values } => service
            .create_record(table, values)
            .map(|_| "record added".to_owned()),
        MutationKind::CreateField { input } => service
            .create_field(table, input)
            .map(|field| format!("added field {}", field.name)),
        MutationKind::BulkCreate { count } => service
            .create_bulk_records(table, count)
            .map(|report| report.message),
        MutationKind::AddDueDateField => service
            .add_due_date_field(table)
            .map(|field| format!("{} field ready", field.name)),
    }
}
