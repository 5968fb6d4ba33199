//! Record store over the backend's REST interface.
//!
//! Tables live at `/rest/v1/<table>`. Rows are filtered with `col=eq.value`
//! and listed oldest first. Row-level security scopes every table to the
//! signed-in user, so no owner filter is sent.

use async_trait::async_trait;
use larder_core::{LarderError, LarderResult, RecordIdType};
use larder_storage::{RecordStore, Resource};
use reqwest::header::ACCEPT;
use reqwest::Method;

use crate::api_client::{ApiClient, ErrorContext};

const REST_PREFIX: &str = "/rest/v1";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";
const LIST_ORDER: &str = "created_at.asc,id.asc";

#[derive(Debug, Clone)]
pub struct RestRecordStore {
    api: ApiClient,
}

impl RestRecordStore {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn table_path<R: Resource>() -> String {
        format!("{REST_PREFIX}/{}", R::ENTITY_TYPE.table())
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn list<R: Resource>(&self, parent: &R::Parent) -> LarderResult<Vec<R>> {
        let mut query = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), LIST_ORDER.to_string()),
        ];
        if let Some((column, value)) = R::parent_filter(parent) {
            query.push((column.to_string(), eq(value)));
        }

        let request = self
            .api
            .request(Method::GET, &Self::table_path::<R>())
            .query(&query);
        let rows: Vec<R> = self
            .api
            .send_json(request, &ErrorContext::Collection(R::ENTITY_TYPE))
            .await?;
        tracing::debug!(entity = ?R::ENTITY_TYPE, count = rows.len(), "Listed rows");
        Ok(rows)
    }

    async fn fetch<R: Resource>(&self, id: &R::Id) -> LarderResult<R> {
        let request = self
            .api
            .request(Method::GET, &Self::table_path::<R>())
            .query(&[("select", "*".to_string()), ("id", eq(id))])
            .header(ACCEPT, SINGLE_OBJECT);
        self.api
            .send_json(request, &ErrorContext::record(R::ENTITY_TYPE, id.as_str()))
            .await
    }

    async fn create<R: Resource>(&self, parent: &R::Parent, draft: &R::Draft) -> LarderResult<R> {
        let payload = R::insert_payload(parent, draft)?;
        let request = self
            .api
            .request(Method::POST, &Self::table_path::<R>())
            .query(&[("select", "*")])
            .header("Prefer", RETURN_REPRESENTATION)
            .header(ACCEPT, SINGLE_OBJECT)
            .json(&payload);
        let context = ErrorContext::Record {
            entity_type: R::ENTITY_TYPE,
            id: None,
        };
        let row: R = self.api.send_json(request, &context).await?;
        tracing::info!(entity = ?R::ENTITY_TYPE, id = %row.id(), "Created row");
        Ok(row)
    }

    async fn update<R: Resource>(&self, id: &R::Id, patch: &R::Patch) -> LarderResult<R> {
        let body = serde_json::to_value(patch).map_err(|e| {
            LarderError::internal(format!("failed to encode {:?} patch: {e}", R::ENTITY_TYPE))
        })?;
        let request = self
            .api
            .request(Method::PATCH, &Self::table_path::<R>())
            .query(&[("select", "*".to_string()), ("id", eq(id))])
            .header("Prefer", RETURN_REPRESENTATION)
            .header(ACCEPT, SINGLE_OBJECT)
            .json(&body);
        let row: R = self
            .api
            .send_json(request, &ErrorContext::record(R::ENTITY_TYPE, id.as_str()))
            .await?;
        tracing::info!(entity = ?R::ENTITY_TYPE, %id, "Updated row");
        Ok(row)
    }

    async fn delete<R: Resource>(&self, id: &R::Id) -> LarderResult<()> {
        let request = self
            .api
            .request(Method::DELETE, &Self::table_path::<R>())
            .query(&[("id", eq(id))])
            .header("Prefer", RETURN_REPRESENTATION);
        // A delete that matches nothing still succeeds; the empty
        // representation tells us the row was already gone.
        let deleted: Vec<serde_json::Value> = self
            .api
            .send_json(request, &ErrorContext::record(R::ENTITY_TYPE, id.as_str()))
            .await?;
        if deleted.is_empty() {
            return Err(LarderError::not_found(R::ENTITY_TYPE, id.as_str()));
        }
        tracing::info!(entity = ?R::ENTITY_TYPE, %id, "Deleted row");
        Ok(())
    }
}
