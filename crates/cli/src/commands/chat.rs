use std::io::{self, BufRead, Write};

use anyhow::Context;
use drivethru_agent::{ConversationService, DecisionProvider, TurnStatus};
use drivethru_core::config::LoadOptions;
use drivethru_core::domain::conversation::ConversationId;
use drivethru_db::repositories::{ConversationRepository, SqlConversationRepository};
use tokio::runtime::Runtime;

use crate::bootstrap::{self, Failure};
use crate::commands::CommandResult;

pub const GREETING: &str = "Hi";
pub const FINALIZED_NOTICE: &str = "Order finalized! Thank you for visiting.";
const EXIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub conversation_id: ConversationId,
    pub turns: usize,
    pub finalized: bool,
}

pub fn run(conversation: Option<String>) -> CommandResult {
    let stdin = io::stdin();
    let stdout = io::stdout();
    match start_session(conversation, stdin.lock(), stdout.lock()) {
        Ok(summary) => {
            let outcome = if summary.finalized { "finalized" } else { "ended" };
            CommandResult::success(
                "chat",
                format!(
                    "conversation {} {outcome} after {} turns",
                    summary.conversation_id, summary.turns
                ),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}

fn start_session(
    conversation: Option<String>,
    input: impl BufRead,
    output: impl Write,
) -> Result<ChatSummary, Failure> {
    let config = bootstrap::load_config(LoadOptions::default())?;
    crate::logging::init(&config);
    let runtime = bootstrap::async_runtime()?;

    let menu = bootstrap::load_menu(&config)?;
    let agent = bootstrap::agent_runtime(&config)?;
    let pool = runtime.block_on(bootstrap::open_database(&config))?;
    let service = ConversationService::new(agent, SqlConversationRepository::new(pool), menu);

    let (conversation_id, greet) = match conversation {
        Some(id) => {
            let id = ConversationId(id);
            runtime
                .block_on(service.resume(&id))
                .map_err(|error| ("conversation_lookup", error.to_string(), bootstrap::EXIT_PERSISTENCE))?;
            (id, false)
        }
        None => {
            let state = runtime
                .block_on(service.start())
                .map_err(|error| ("conversation_start", error.to_string(), bootstrap::EXIT_PERSISTENCE))?;
            (state.conversation_id, true)
        }
    };

    converse(&runtime, &service, conversation_id, greet, input, output)
        .map_err(|error| ("terminal_io", format!("{error:#}"), bootstrap::EXIT_RUNTIME))
}

/// Runs the read-eval-print loop until the customer leaves, input ends,
/// or the order is finalized. Turn failures are spoken to the customer
/// and the loop carries on with the last persisted state.
pub fn converse<P, R>(
    runtime: &Runtime,
    service: &ConversationService<P, R>,
    conversation_id: ConversationId,
    greet: bool,
    mut input: impl BufRead,
    mut output: impl Write,
) -> anyhow::Result<ChatSummary>
where
    P: DecisionProvider,
    R: ConversationRepository,
{
    let mut summary = ChatSummary { conversation_id, turns: 0, finalized: false };
    writeln!(output, "Conversation {} (type quit to leave)", summary.conversation_id)
        .context("writing banner")?;

    if greet && take_turn(runtime, service, &mut summary, GREETING, &mut output)? {
        return Ok(summary);
    }

    let mut line = String::new();
    loop {
        write!(output, "You: ").context("writing prompt")?;
        output.flush().context("flushing prompt")?;

        line.clear();
        if input.read_line(&mut line).context("reading customer input")? == 0 {
            break;
        }
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        if EXIT_WORDS.iter().any(|word| utterance.eq_ignore_ascii_case(word)) {
            break;
        }
        if take_turn(runtime, service, &mut summary, utterance, &mut output)? {
            break;
        }
    }

    Ok(summary)
}

/// Returns true once the order has been finalized.
fn take_turn<P, R>(
    runtime: &Runtime,
    service: &ConversationService<P, R>,
    summary: &mut ChatSummary,
    utterance: &str,
    output: &mut impl Write,
) -> anyhow::Result<bool>
where
    P: DecisionProvider,
    R: ConversationRepository,
{
    match runtime.block_on(service.handle_utterance(&summary.conversation_id, utterance)) {
        Ok(result) => {
            summary.turns += 1;
            writeln!(output, "Agent: {}", result.response).context("writing reply")?;
            if result.status == TurnStatus::Finalized {
                summary.finalized = true;
                writeln!(output, "{FINALIZED_NOTICE}").context("writing reply")?;
                return Ok(true);
            }
        }
        Err(error) => {
            writeln!(output, "Agent: {}", error.user_message()).context("writing reply")?;
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use drivethru_agent::mock::ScriptedDecisionProvider;
    use drivethru_agent::{AgentRuntime, ConversationService, Decision, DecisionError, SystemPrompt};
    use drivethru_core::domain::conversation::ToolCall;
    use drivethru_core::domain::menu::Menu;
    use drivethru_db::repositories::InMemoryConversationRepository;
    use serde_json::json;

    use super::{converse, FINALIZED_NOTICE};
    use crate::bootstrap;

    type Service = ConversationService<ScriptedDecisionProvider, InMemoryConversationRepository>;

    fn service(script: Vec<Result<Decision, DecisionError>>) -> Service {
        let menu = Menu::from_json_str(include_str!("../../../../menus/breakfast-v2.json")).expect("menu");
        let runtime = AgentRuntime::new(
            ScriptedDecisionProvider::new(script),
            SystemPrompt::builtin().expect("prompt"),
        );
        ConversationService::new(runtime, InMemoryConversationRepository::default(), Arc::new(menu))
    }

    fn transcript(output: Vec<u8>) -> String {
        String::from_utf8(output).expect("utf8 transcript")
    }

    #[test]
    fn greets_then_leaves_on_quit() {
        let runtime = bootstrap::async_runtime().expect("runtime");
        let service = service(vec![Ok(Decision::respond("Welcome! What can I get you?"))]);
        let state = runtime.block_on(service.start()).expect("start");

        let mut output = Vec::new();
        let summary = converse(
            &runtime,
            &service,
            state.conversation_id,
            true,
            Cursor::new("\nquit\n"),
            &mut output,
        )
        .expect("session");

        assert_eq!(summary.turns, 1);
        assert!(!summary.finalized);
        assert!(transcript(output).contains("Agent: Welcome! What can I get you?"));
    }

    #[test]
    fn finalized_order_ends_the_session() {
        let runtime = bootstrap::async_runtime().expect("runtime");
        let service = service(vec![Ok(Decision::call_tools(
            "<reasoning>Customer is done.</reasoning>",
            vec![ToolCall::new("call-1", "finalize_order", json!({}))],
        ))]);
        let state = runtime.block_on(service.start()).expect("start");

        let mut output = Vec::new();
        let summary = converse(
            &runtime,
            &service,
            state.conversation_id,
            false,
            Cursor::new("that's all\nnever read\n"),
            &mut output,
        )
        .expect("session");

        assert!(summary.finalized);
        assert_eq!(summary.turns, 1);
        assert!(transcript(output).contains(FINALIZED_NOTICE));
    }

    #[test]
    fn failed_turn_apologizes_and_keeps_listening() {
        let runtime = bootstrap::async_runtime().expect("runtime");
        let service = service(vec![
            Err(DecisionError::Rejected { status: 400, message: "bad request".to_string() }),
            Ok(Decision::respond("Sure, one hash brown.")),
        ]);
        let state = runtime.block_on(service.start()).expect("start");

        let mut output = Vec::new();
        let summary = converse(
            &runtime,
            &service,
            state.conversation_id,
            false,
            Cursor::new("hash brown\nhash brown\n"),
            &mut output,
        )
        .expect("session");

        assert_eq!(summary.turns, 1);
        let transcript = transcript(output);
        assert!(transcript.contains("repeat"));
        assert!(transcript.contains("Agent: Sure, one hash brown."));
    }
}
