//! REST client for the notes and chat API.
//!
//! [`RemoteStore`] is the seam the sync core talks to; [`HttpRemote`] is the
//! reqwest implementation against `{server_url}/api`.

use futures_util::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::config::Config;
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::ids::{ConversationId, NoteId, NotebookId, SectionId, VersionId};
use crate::shared::messaging::{Conversation, Message, MessagePage, SendMessageRequest};
use crate::shared::notes::{
    MoveSectionRequest, Note, NoteSnapshot, NoteSummary, NoteVersion, Notebook, NotebookRequest, Section,
    ShareNoteRequest, TitleRequest,
};

/// Remote operations consumed by the sync core
pub trait RemoteStore: Send + Sync + 'static {
    fn list_notebooks(&self) -> BoxFuture<'_, SyncResult<Vec<Notebook>>>;
    fn create_notebook(&self, request: NotebookRequest) -> BoxFuture<'_, SyncResult<Notebook>>;
    fn update_notebook(&self, id: NotebookId, request: NotebookRequest) -> BoxFuture<'_, SyncResult<Notebook>>;
    fn delete_notebook(&self, id: NotebookId) -> BoxFuture<'_, SyncResult<()>>;
    fn reorder_notebooks(&self, ids: Vec<NotebookId>) -> BoxFuture<'_, SyncResult<()>>;

    /// Hierarchical section tree of a notebook
    fn section_tree(&self, notebook_id: NotebookId) -> BoxFuture<'_, SyncResult<Vec<Section>>>;
    fn create_section(&self, notebook_id: NotebookId, title: String) -> BoxFuture<'_, SyncResult<Section>>;
    fn create_sub_section(&self, parent_id: SectionId, title: String) -> BoxFuture<'_, SyncResult<Section>>;
    fn section_children(&self, parent_id: SectionId) -> BoxFuture<'_, SyncResult<Vec<Section>>>;
    fn move_section(&self, id: SectionId, parent_id: Option<SectionId>) -> BoxFuture<'_, SyncResult<()>>;
    fn rename_section(&self, id: SectionId, title: String) -> BoxFuture<'_, SyncResult<()>>;
    fn delete_section(&self, id: SectionId) -> BoxFuture<'_, SyncResult<()>>;
    fn reorder_sections(&self, notebook_id: NotebookId, ids: Vec<SectionId>) -> BoxFuture<'_, SyncResult<()>>;

    fn list_notes(&self, section_id: SectionId) -> BoxFuture<'_, SyncResult<Vec<Note>>>;
    fn get_note(&self, id: NoteId) -> BoxFuture<'_, SyncResult<Note>>;
    fn search_notes(&self, query: String) -> BoxFuture<'_, SyncResult<Vec<NoteSummary>>>;
    fn share_note(&self, id: NoteId, request: ShareNoteRequest) -> BoxFuture<'_, SyncResult<()>>;
    fn create_note(&self, section_id: SectionId, snapshot: NoteSnapshot) -> BoxFuture<'_, SyncResult<Note>>;
    fn update_note(&self, id: NoteId, snapshot: NoteSnapshot) -> BoxFuture<'_, SyncResult<Note>>;
    fn update_tags(&self, id: NoteId, tags: Vec<String>) -> BoxFuture<'_, SyncResult<Note>>;
    fn delete_note(&self, id: NoteId) -> BoxFuture<'_, SyncResult<()>>;
    /// Flip the server-side pin flag; returns the note after the flip
    fn toggle_pin(&self, id: NoteId) -> BoxFuture<'_, SyncResult<Note>>;
    fn pinned_notes(&self) -> BoxFuture<'_, SyncResult<Vec<Note>>>;
    fn reorder_notes(&self, ids: Vec<NoteId>) -> BoxFuture<'_, SyncResult<()>>;
    fn list_versions(&self, id: NoteId) -> BoxFuture<'_, SyncResult<Vec<NoteVersion>>>;
    fn restore_version(&self, version_id: VersionId) -> BoxFuture<'_, SyncResult<Note>>;

    fn list_conversations(&self) -> BoxFuture<'_, SyncResult<Vec<Conversation>>>;
    fn message_history(&self, conversation_id: ConversationId) -> BoxFuture<'_, SyncResult<Vec<Message>>>;
    fn send_message(
        &self,
        conversation_id: ConversationId,
        request: SendMessageRequest,
    ) -> BoxFuture<'_, SyncResult<Message>>;
}

/// HTTP implementation of [`RemoteStore`]
pub struct HttpRemote {
    config: Config,
    client: Client,
}

impl HttpRemote {
    pub fn new(config: Config) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(config.app().request_timeout())
            .build()
            .map_err(|e| SyncError::transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.config.api_url(path);
        tracing::debug!("{} {}", method, url);
        let mut request = self.client.request(method, url);
        if let Some(token) = self.config.get_token() {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> SyncResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        Err(match status.as_u16() {
            401 | 403 => SyncError::auth_rejected(format!("{} - {}", status, error_text)),
            404 => SyncError::stale(resource),
            _ => SyncError::persist(resource, format!("Request failed: {} - {}", status, error_text)),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let response = self.send(self.request(Method::GET, path), path).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> SyncResult<T> {
        let response = self.send(self.request(method, path).json(body), path).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_unit<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: Option<&B>) -> SyncResult<()> {
        let mut request = self.request(method, path);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request, path).await?;
        Ok(())
    }
}

impl RemoteStore for HttpRemote {
    fn list_notebooks(&self) -> BoxFuture<'_, SyncResult<Vec<Notebook>>> {
        Box::pin(self.get_json("/notebooks"))
    }

    fn create_notebook(&self, request: NotebookRequest) -> BoxFuture<'_, SyncResult<Notebook>> {
        Box::pin(async move { self.send_json(Method::POST, "/notebooks", &request).await })
    }

    fn update_notebook(&self, id: NotebookId, request: NotebookRequest) -> BoxFuture<'_, SyncResult<Notebook>> {
        Box::pin(async move {
            self.send_json(Method::PUT, &format!("/notebooks/{}", id), &request)
                .await
        })
    }

    fn delete_notebook(&self, id: NotebookId) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.send_unit::<()>(Method::DELETE, &format!("/notebooks/{}", id), None)
                .await
        })
    }

    fn reorder_notebooks(&self, ids: Vec<NotebookId>) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.send_unit(Method::POST, "/notebooks/reorder", Some(&ids))
                .await
        })
    }

    fn section_tree(&self, notebook_id: NotebookId) -> BoxFuture<'_, SyncResult<Vec<Section>>> {
        Box::pin(async move {
            self.get_json(&format!("/notebooks/{}/sections?hierarchical=true", notebook_id))
                .await
        })
    }

    fn create_section(&self, notebook_id: NotebookId, title: String) -> BoxFuture<'_, SyncResult<Section>> {
        Box::pin(async move {
            self.send_json(
                Method::POST,
                &format!("/notebooks/{}/sections", notebook_id),
                &TitleRequest { title },
            )
            .await
        })
    }

    fn create_sub_section(&self, parent_id: SectionId, title: String) -> BoxFuture<'_, SyncResult<Section>> {
        Box::pin(async move {
            self.send_json(
                Method::POST,
                &format!("/notebooks/sections/{}/children", parent_id),
                &TitleRequest { title },
            )
            .await
        })
    }

    fn section_children(&self, parent_id: SectionId) -> BoxFuture<'_, SyncResult<Vec<Section>>> {
        Box::pin(async move {
            self.get_json(&format!("/notebooks/sections/{}/children", parent_id))
                .await
        })
    }

    fn move_section(&self, id: SectionId, parent_id: Option<SectionId>) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.send_unit(
                Method::POST,
                &format!("/notebooks/sections/{}/move", id),
                Some(&MoveSectionRequest { parent_id }),
            )
            .await
        })
    }

    fn rename_section(&self, id: SectionId, title: String) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.send_unit(Method::PUT, &format!("/sections/{}", id), Some(&TitleRequest { title }))
                .await
        })
    }

    fn delete_section(&self, id: SectionId) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.send_unit::<()>(Method::DELETE, &format!("/notebooks/sections/{}", id), None)
                .await
        })
    }

    fn reorder_sections(&self, notebook_id: NotebookId, ids: Vec<SectionId>) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.send_unit(
                Method::POST,
                &format!("/notebooks/{}/sections/reorder", notebook_id),
                Some(&ids),
            )
            .await
        })
    }

    fn list_notes(&self, section_id: SectionId) -> BoxFuture<'_, SyncResult<Vec<Note>>> {
        Box::pin(async move { self.get_json(&format!("/sections/{}/notes", section_id)).await })
    }

    fn get_note(&self, id: NoteId) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move { self.get_json(&format!("/notes/{}", id)).await })
    }

    fn search_notes(&self, query: String) -> BoxFuture<'_, SyncResult<Vec<NoteSummary>>> {
        Box::pin(async move {
            let path = "/notes/search";
            let request = self.request(Method::GET, path).query(&[("q", query.as_str())]);
            let response = self.send(request, path).await?;
            Ok(response.json::<Vec<NoteSummary>>().await?)
        })
    }

    fn share_note(&self, id: NoteId, request: ShareNoteRequest) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.send_unit(Method::POST, &format!("/notes/{}/share", id), Some(&request))
                .await
        })
    }

    fn create_note(&self, section_id: SectionId, snapshot: NoteSnapshot) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move {
            self.send_json(Method::POST, &format!("/sections/{}/notes", section_id), &snapshot)
                .await
        })
    }

    fn update_note(&self, id: NoteId, snapshot: NoteSnapshot) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move {
            self.send_json(Method::PUT, &format!("/notes/{}", id), &snapshot)
                .await
        })
    }

    fn update_tags(&self, id: NoteId, tags: Vec<String>) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move {
            self.send_json(Method::PUT, &format!("/notes/{}/tags", id), &tags)
                .await
        })
    }

    fn delete_note(&self, id: NoteId) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.send_unit::<()>(Method::DELETE, &format!("/notes/{}", id), None)
                .await
        })
    }

    fn toggle_pin(&self, id: NoteId) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move {
            let path = format!("/notes/{}/toggle-pin", id);
            let response = self.send(self.request(Method::POST, &path), &path).await?;
            Ok(response.json::<Note>().await?)
        })
    }

    fn pinned_notes(&self) -> BoxFuture<'_, SyncResult<Vec<Note>>> {
        Box::pin(self.get_json("/notes/pinned"))
    }

    fn reorder_notes(&self, ids: Vec<NoteId>) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move { self.send_unit(Method::POST, "/notes/reorder", Some(&ids)).await })
    }

    fn list_versions(&self, id: NoteId) -> BoxFuture<'_, SyncResult<Vec<NoteVersion>>> {
        Box::pin(async move { self.get_json(&format!("/notes/{}/versions", id)).await })
    }

    fn restore_version(&self, version_id: VersionId) -> BoxFuture<'_, SyncResult<Note>> {
        Box::pin(async move {
            let path = format!("/notes/versions/{}/restore", version_id);
            let response = self.send(self.request(Method::POST, &path), &path).await?;
            Ok(response.json::<Note>().await?)
        })
    }

    fn list_conversations(&self) -> BoxFuture<'_, SyncResult<Vec<Conversation>>> {
        Box::pin(self.get_json("/chat/conversations"))
    }

    fn message_history(&self, conversation_id: ConversationId) -> BoxFuture<'_, SyncResult<Vec<Message>>> {
        Box::pin(async move {
            let page: MessagePage = self
                .get_json(&format!("/chat/conversations/{}/messages", conversation_id))
                .await?;
            Ok(page.content)
        })
    }

    fn send_message(
        &self,
        conversation_id: ConversationId,
        request: SendMessageRequest,
    ) -> BoxFuture<'_, SyncResult<Message>> {
        Box::pin(async move {
            self.send_json(
                Method::POST,
                &format!("/chat/conversations/{}/messages", conversation_id),
                &request,
            )
            .await
        })
    }
}
