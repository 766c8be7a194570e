//! Dispatch loop
//!
//! One receive loop per session. Each function call runs as its own task
//! so slow handlers (image generation) never hold up later envelopes;
//! results come back in completion order and are answered with a function
//! result followed by `response.create`.

use super::envelope::{parse_inbound, FunctionCall, Inbound, Outbound};
use crate::tools::{ToolContext, ToolOutput, ToolSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Routes function calls to the tool set
#[derive(Clone)]
pub struct Dispatcher {
    tools: Arc<ToolSet>,
    ctx: ToolContext,
}

impl Dispatcher {
    pub fn new(tools: Arc<ToolSet>, ctx: ToolContext) -> Self {
        Self { tools, ctx }
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Consume inbound frames until the sender goes away, then wait for the
    /// calls still in flight so none is left unanswered.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<String>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) {
        let mut in_flight: JoinSet<(String, ToolOutput)> = JoinSet::new();

        loop {
            tokio::select! {
                frame = inbound.recv() => {
                    let Some(frame) = frame else { break };
                    if let Some(call) = self.classify(&frame) {
                        self.start(call, &mut in_flight, &outbound);
                    }
                }
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Ok((call_id, output)) = done {
                        respond(&outbound, call_id, &output);
                    }
                }
            }
        }

        while let Some(done) = in_flight.join_next().await {
            if let Ok((call_id, output)) = done {
                respond(&outbound, call_id, &output);
            }
        }
        debug!("Dispatch loop finished");
    }

    fn classify(&self, frame: &str) -> Option<FunctionCall> {
        match parse_inbound(frame) {
            Ok(Inbound::FunctionCall(call)) => Some(call),
            Ok(Inbound::ServiceError(message)) => {
                warn!("Realtime service reported an error: {}", message);
                None
            }
            Ok(Inbound::Other(kind)) => {
                debug!("Ignoring {} frame", kind);
                None
            }
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                None
            }
        }
    }

    fn start(
        &self,
        call: FunctionCall,
        in_flight: &mut JoinSet<(String, ToolOutput)>,
        outbound: &mpsc::UnboundedSender<Outbound>,
    ) {
        let Some(handler) = self.tools.get(&call.name).cloned() else {
            warn!("Unknown tool {} (call {}), ignoring", call.name, call.call_id);
            return;
        };

        let args = match call.parse_arguments() {
            Ok(args) => args,
            Err(e) => {
                warn!("Call {} to {}: {}", call.call_id, call.name, e);
                respond(outbound, call.call_id, &ToolOutput::from(e));
                return;
            }
        };

        info!("Invoking {} (call {})", call.name, call.call_id);
        let ctx = self.ctx.clone();
        in_flight.spawn(async move {
            let FunctionCall { name, call_id, .. } = call;
            // Inner task so a panicking handler still yields an answer
            let output = match tokio::spawn(async move { handler.call(&ctx, args).await }).await {
                Ok(output) => output,
                Err(e) if e.is_panic() => {
                    warn!("Tool {} panicked (call {})", name, call_id);
                    ToolOutput::failure(format!("Tool {} failed unexpectedly", name))
                }
                Err(_) => ToolOutput::failure(format!("Tool {} was cancelled", name)),
            };
            if let Some(error) = output.error() {
                warn!("Tool {} failed (call {}): {}", name, call_id, error);
            }
            (call_id, output)
        });
    }
}

fn respond(outbound: &mpsc::UnboundedSender<Outbound>, call_id: String, output: &ToolOutput) {
    if outbound
        .send(Outbound::function_result(call_id, output))
        .and_then(|_| outbound.send(Outbound::ResponseCreate))
        .is_err()
    {
        debug!("Outbound sink closed, dropping result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::envelope::ConversationItem;
    use crate::tools::testing;
    use crate::tools::Handler;
    use serde_json::{json, Value};

    fn call_frame(name: &str, call_id: &str, arguments: &str) -> String {
        json!({
            "type": "response.function_call_arguments.done",
            "name": name,
            "call_id": call_id,
            "arguments": arguments,
        })
        .to_string()
    }

    async fn run_frames(tools: ToolSet, frames: Vec<String>) -> Vec<Outbound> {
        let dispatcher = Dispatcher::new(Arc::new(tools), testing::context());
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        for frame in frames {
            in_tx.send(frame).await.unwrap();
        }
        drop(in_tx);
        dispatcher.run(in_rx, out_tx).await;

        let mut sent = Vec::new();
        while let Ok(frame) = out_rx.try_recv() {
            sent.push(frame);
        }
        sent
    }

    fn output_of(frame: &Outbound) -> Value {
        match frame {
            Outbound::ConversationItemCreate {
                item: ConversationItem::FunctionCallOutput { output, .. },
            } => serde_json::from_str(output).unwrap(),
            other => panic!("not a function result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_result_then_continue() {
        let sent = run_frames(
            ToolSet::standard().unwrap(),
            vec![call_frame("addButton", "call_1", r#"{"text":"Go","buttonId":"b1"}"#)],
        )
        .await;

        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].call_id(), Some("call_1"));
        assert_eq!(output_of(&sent[0]), json!({"success": true, "buttonId": "b1"}));
        assert_eq!(sent[1], Outbound::ResponseCreate);
    }

    #[tokio::test]
    async fn test_malformed_arguments_answered_once() {
        let sent = run_frames(
            ToolSet::standard().unwrap(),
            vec![call_frame("addText", "call_bad", "{\"text\": ")],
        )
        .await;

        let results: Vec<_> = sent.iter().filter(|f| f.call_id().is_some()).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].call_id(), Some("call_bad"));
        assert_eq!(output_of(results[0])["success"], json!(false));
    }

    #[tokio::test]
    async fn test_object_arguments_accepted() {
        let frame = json!({
            "type": "response.function_call_arguments.done",
            "name": "addText",
            "call_id": "call_obj",
            "arguments": {"text": "hi"},
        });
        let sent = run_frames(ToolSet::standard().unwrap(), vec![frame.to_string()]).await;

        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].call_id(), Some("call_obj"));
        assert_eq!(output_of(&sent[0])["success"], json!(true));
    }

    #[tokio::test]
    async fn test_non_object_arguments_answered_once() {
        let frame = json!({
            "type": "response.function_call_arguments.done",
            "name": "addText",
            "call_id": "call_num",
            "arguments": 42,
        });
        let sent = run_frames(ToolSet::standard().unwrap(), vec![frame.to_string()]).await;

        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].call_id(), Some("call_num"));
        assert_eq!(output_of(&sent[0])["success"], json!(false));
        assert_eq!(sent[1], Outbound::ResponseCreate);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_noise_ignored() {
        let sent = run_frames(
            ToolSet::standard().unwrap(),
            vec![
                call_frame("launchRockets", "call_x", "{}"),
                r#"{"type":"response.done"}"#.to_string(),
                "garbage".to_string(),
            ],
        )
        .await;
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_handler_still_answers() {
        let mut tools = ToolSet::new();
        tools
            .register(
                "explode",
                Handler::sync(|_, _: crate::tools::set::NoArgs| -> crate::Result<ToolOutput> {
                    panic!("boom")
                }),
            )
            .unwrap();

        let sent = run_frames(tools, vec![call_frame("explode", "call_p", "")]).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].call_id(), Some("call_p"));
        let output = output_of(&sent[0]);
        assert_eq!(output["success"], json!(false));
        assert!(output["error"].as_str().unwrap().contains("explode"));
    }
}
