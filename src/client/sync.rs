//! Glue between push topics and local state.
//!
//! The [`SyncCoordinator`] owns the subscriptions that follow the user's view:
//! the private sidebar destination (tree invalidations) and the topic of the
//! selected conversation (new messages). Sidebar events are applied one at a
//! time on a worker task; message pushes are appended directly by the topic
//! handler.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::api::RemoteStore;
use crate::client::arrivals::NewArrivals;
use crate::client::events::{EventBus, SyncEvent};
use crate::client::messages::MessageLists;
use crate::client::router::{Delivery, SubscriptionHandle, TopicRouter};
use crate::client::workspace::NotesWorkspace;
use crate::shared::error::SyncResult;
use crate::shared::event::SidebarEvent;
use crate::shared::ids::ConversationId;
use crate::shared::messaging::{Conversation, Message, SendMessageRequest};

/// Destination of a conversation's message stream
pub fn conversation_topic(conversation_id: ConversationId) -> String {
    format!("/topic/conversation/{}", conversation_id)
}

#[derive(Default)]
struct Selection {
    generation: u64,
    conversation: Option<ConversationId>,
    handle: Option<SubscriptionHandle>,
}

struct SyncInner {
    router: TopicRouter,
    workspace: NotesWorkspace,
    arrivals: NewArrivals,
    messages: Mutex<MessageLists>,
    selection: Mutex<Selection>,
    sidebar: Mutex<Option<SubscriptionHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncInner {
    fn remote(&self) -> &Arc<dyn RemoteStore> {
        self.workspace.remote()
    }

    fn bus(&self) -> &EventBus<SyncEvent> {
        self.workspace.bus()
    }

    fn messages(&self) -> MutexGuard<'_, MessageLists> {
        self.messages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn selection(&self) -> MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn append(&self, message: Message) -> bool {
        let (conversation_id, message_id) = (message.conversation_id, message.id);
        let added = self.messages().append(message);
        if added {
            self.bus().emit(SyncEvent::MessageAppended {
                conversation_id,
                message_id,
            });
        }
        added
    }

    /// Apply one sidebar invalidation
    async fn apply_sidebar(&self, event: SidebarEvent) {
        if !event.is_refresh() {
            tracing::debug!("ignoring sidebar event {:?}", event.kind);
            return;
        }
        // Ids the tree already holds are not arrivals
        self.arrivals.observe(self.workspace.read(|tree| tree.node_ids()));
        let located = event.target_id.and_then(|id| {
            self.workspace
                .read(|tree| tree.locate(id).and_then(|node| tree.notebook_of(node)))
        });

        let result = match located {
            Some(notebook_id) => self.workspace.refresh_notebook(notebook_id).await.map(|_| ()),
            None => self.workspace.reload_all().await,
        };
        if let Err(e) = result {
            tracing::warn!("sidebar refresh failed: {}", e);
        }

        if let (Some(id), None) = (event.target_id, located) {
            self.arrivals.mark(id);
        }
    }
}

/// Subscribes to the topics the current view needs and applies their pushes
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<SyncInner>,
}

impl SyncCoordinator {
    pub fn new(router: TopicRouter, workspace: NotesWorkspace, arrivals: NewArrivals) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                router,
                workspace,
                arrivals,
                messages: Mutex::new(MessageLists::new()),
                selection: Mutex::new(Selection::default()),
                sidebar: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn workspace(&self) -> &NotesWorkspace {
        &self.inner.workspace
    }

    pub fn router(&self) -> &TopicRouter {
        &self.inner.router
    }

    pub fn arrivals(&self) -> &NewArrivals {
        &self.inner.arrivals
    }

    fn track(&self, task: JoinHandle<()>) {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(task);
    }

    /// Subscribe to the private sidebar destination and start forwarding
    /// connection state to the event bus
    pub fn start(&self, sidebar_destination: impl Into<String>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<SidebarEvent>();
        let handle = self.inner.router.subscribe(sidebar_destination, move |delivery: Delivery| {
            match delivery.json::<SidebarEvent>() {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => tracing::warn!("malformed sidebar event on {}: {}", delivery.topic, e),
            }
        });
        *self.inner.sidebar.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);

        let weak = Arc::downgrade(&self.inner);
        self.track(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.apply_sidebar(event).await;
            }
        }));

        let mut states = self.inner.router.connection().watch_state();
        let bus = self.inner.bus().clone();
        self.track(tokio::spawn(async move {
            loop {
                let state = *states.borrow_and_update();
                bus.emit(SyncEvent::Connection(state));
                if states.changed().await.is_err() {
                    break;
                }
            }
        }));
        tracing::info!("sync coordinator started");
    }

    /// Switch the message stream to `conversation_id`.
    ///
    /// The previous conversation is unsubscribed first; the new topic is only
    /// subscribed once its history has loaded. Returns `Ok(false)` when a newer
    /// selection superseded this one while history was loading.
    pub async fn select_conversation(&self, conversation_id: ConversationId) -> SyncResult<bool> {
        let generation = {
            let mut selection = self.inner.selection();
            if let Some(previous) = selection.handle.take() {
                self.inner.router.unsubscribe(&previous);
            }
            selection.generation += 1;
            selection.conversation = Some(conversation_id);
            selection.generation
        };

        let history = self.inner.remote().message_history(conversation_id).await;

        let mut selection = self.inner.selection();
        if selection.generation != generation {
            tracing::debug!("selection of {} superseded", conversation_id);
            return Ok(false);
        }
        let history = history?;
        let count = self.inner.messages().set_history(conversation_id, history);
        self.inner.bus().emit(SyncEvent::HistoryLoaded {
            conversation_id,
            count,
        });

        let weak: Weak<SyncInner> = Arc::downgrade(&self.inner);
        let handle = self
            .inner
            .router
            .subscribe(conversation_topic(conversation_id), move |delivery: Delivery| {
                let Some(inner) = weak.upgrade() else { return };
                match delivery.json::<Message>() {
                    Ok(message) if message.conversation_id == conversation_id => {
                        inner.append(message);
                    }
                    Ok(message) => tracing::warn!(
                        "message {} for {} arrived on {}",
                        message.id,
                        message.conversation_id,
                        delivery.topic
                    ),
                    Err(e) => tracing::warn!("malformed message on {}: {}", delivery.topic, e),
                }
            });
        selection.handle = Some(handle);
        tracing::info!("selected conversation {} ({} messages)", conversation_id, count);
        Ok(true)
    }

    /// Leave the current conversation
    pub fn clear_selection(&self) {
        let mut selection = self.inner.selection();
        if let Some(previous) = selection.handle.take() {
            self.inner.router.unsubscribe(&previous);
        }
        selection.generation += 1;
        selection.conversation = None;
    }

    pub fn selected_conversation(&self) -> Option<ConversationId> {
        self.inner.selection().conversation
    }

    pub fn messages(&self, conversation_id: ConversationId) -> Vec<Message> {
        self.inner.messages().messages(conversation_id).to_vec()
    }

    pub async fn conversations(&self) -> SyncResult<Vec<Conversation>> {
        self.inner.remote().list_conversations().await
    }

    /// Send a message and append the server's copy
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        request: SendMessageRequest,
    ) -> SyncResult<Message> {
        let message = self.inner.remote().send_message(conversation_id, request).await?;
        self.inner.append(message.clone());
        Ok(message)
    }

    /// Drop every subscription and stop background tasks
    pub fn shutdown(&self) {
        self.clear_selection();
        let sidebar = self
            .inner
            .sidebar
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = sidebar {
            self.inner.router.unsubscribe(&handle);
        }
        let tasks: Vec<JoinHandle<()>> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
        self.inner.arrivals.reset();
        tracing::info!("sync coordinator stopped");
    }
}
