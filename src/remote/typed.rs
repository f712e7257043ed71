//! Conversions between JSON rows and typed records.

use super::{Filter, Query, RemoteStore, Row, WriteOp};
use crate::core::{ColabError, Result};
use crate::model::Record;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub fn to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(row) => Ok(row),
        other => Err(ColabError::Decode(format!("expected a row object, got {}", other))),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(row))?)
}

pub fn insert_op<T: Record>(record: &T) -> Result<WriteOp> {
    Ok(WriteOp::Insert {
        table: T::TABLE,
        row: to_row(record)?,
    })
}

pub async fn select<T: Record>(store: &dyn RemoteStore, query: Query) -> Result<Vec<T>> {
    if query.table != T::TABLE {
        return Err(ColabError::Validation(format!(
            "query on {} cannot decode {} rows",
            query.table,
            T::TABLE
        )));
    }
    store.query(query).await?.into_iter().map(from_row).collect()
}

pub async fn find_one<T: Record>(store: &dyn RemoteStore, filter: Filter) -> Result<Option<T>> {
    let query = Query::table(T::TABLE).filter(filter).limit(1);
    Ok(select::<T>(store, query).await?.into_iter().next())
}

pub async fn find_by_id<T: Record>(store: &dyn RemoteStore, id: Uuid) -> Result<Option<T>> {
    find_one::<T>(store, Filter::by_id(id)).await
}

pub async fn get_by_id<T: Record>(store: &dyn RemoteStore, id: Uuid) -> Result<T> {
    find_by_id::<T>(store, id)
        .await?
        .ok_or_else(|| ColabError::not_found(T::TABLE.name(), id))
}
