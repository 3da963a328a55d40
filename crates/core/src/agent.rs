mod builder;
mod state;

use tokio::sync::mpsc;
use tracing::Instrument;

pub use builder::AgentBuilder;
use state::{AgentMessage, AgentState};

/// Where a transcript string originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranscriptSource {
    /// A delta of an assistant message.
    Assistant,
    /// The output of a tool call.
    Tool,
}

/// An agent instance, which maintains a conversation, a model provider,
/// and internal state.
///
/// The agent runs as a background task driven by a mailbox, and this
/// type is a cheap handle to it. Messages are handled immediately, no
/// matter what stage the agent is in: if an input arrives while the
/// agent is thinking or running tools, it is queued and processed once
/// the agent becomes idle again.
pub struct Agent {
    msg_tx: mpsc::UnboundedSender<AgentMessage>,
}

impl Agent {
    /// Enqueues a user input for processing.
    pub fn enqueue_user_input<S: Into<String>>(&self, input: S) {
        self.msg_tx
            .send(AgentMessage::UserInput(input.into()))
            .expect("agent task has been dropped too early");
    }
}

impl Agent {
    fn spawn_from_builder(builder: AgentBuilder) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let state = AgentState::from_builder(builder);
        tokio::spawn(
            run_agent(state, msg_rx, msg_tx.downgrade())
                .instrument(trace_span!("agent")),
        );
        Self { msg_tx }
    }
}

impl Clone for Agent {
    fn clone(&self) -> Self {
        Self {
            msg_tx: self.msg_tx.clone(),
        }
    }
}

/// The agent task.
///
/// The loop holds only a weak sender: once every [`Agent`] handle and
/// every in-flight task has gone, `recv` returns `None` and the task
/// winds down instead of lingering forever.
async fn run_agent(
    mut state: AgentState,
    mut msg_rx: mpsc::UnboundedReceiver<AgentMessage>,
    msg_tx: mpsc::WeakUnboundedSender<AgentMessage>,
) {
    debug!("started");
    while let Some(msg) = msg_rx.recv().await {
        trace!("received message: {msg:?}");
        state.handle(msg, &msg_tx);
    }
    debug!("will terminate");
}
