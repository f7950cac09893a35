//! Line-oriented chat loop and the one-shot `say` command.

use std::error::Error;
use std::io::{self, Write};

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::api::{Backend, FunctionResult};
use crate::cli::credentials::collect_and_submit;
use crate::cli::display::{outcome_notice, InvocationProgress, TerminalDisplay};
use crate::cli::servers::format_servers;
use crate::cli::tools::parse_arguments;
use crate::cli::CliContext;
use crate::core::conversation::{ChatClient, TurnObserver, TurnOutcome};
use crate::core::session::SessionContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Message(String),
    Servers,
    Add(String),
    Credentials(String),
    Invoke {
        server: String,
        tool: String,
        arguments: Option<String>,
    },
    Log(Option<String>),
    Reset,
    Help,
    Quit,
    Empty,
    /// A slash command that could not be understood; carries the usage hint.
    Invalid(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplCommand::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return ReplCommand::Message(line.to_string());
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        match name {
            "servers" => ReplCommand::Servers,
            "add" => single_argument(rest, ReplCommand::Add, "Usage: /add <server>"),
            "credentials" => single_argument(
                rest,
                ReplCommand::Credentials,
                "Usage: /credentials <server>",
            ),
            "invoke" => {
                let mut parts = rest.splitn(3, char::is_whitespace);
                match (parts.next(), parts.next()) {
                    (Some(server), Some(tool)) if !server.is_empty() && !tool.is_empty() => {
                        ReplCommand::Invoke {
                            server: server.to_string(),
                            tool: tool.to_string(),
                            arguments: parts
                                .next()
                                .map(str::trim)
                                .filter(|args| !args.is_empty())
                                .map(str::to_string),
                        }
                    }
                    _ => ReplCommand::Invalid("Usage: /invoke <server> <tool> [json]".to_string()),
                }
            }
            "log" => ReplCommand::Log((!rest.is_empty()).then(|| rest.to_string())),
            "reset" => ReplCommand::Reset,
            "help" => ReplCommand::Help,
            "quit" | "exit" => ReplCommand::Quit,
            other => ReplCommand::Invalid(format!("Unknown command: /{other}. Try /help.")),
        }
    }
}

fn single_argument(rest: &str, build: fn(String) -> ReplCommand, usage: &str) -> ReplCommand {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        ReplCommand::Invalid(usage.to_string())
    } else {
        build(rest.to_string())
    }
}

const HELP: &str = "\
/servers                         List servers attached to this session
/add <server>                    Attach a server
/credentials <server>            Enter credentials for a server
/invoke <server> <tool> [json]   Run a tool directly
/log [filename]                  Enable or toggle the transcript log
/reset                           Start a new session
/quit                            Leave the chat";

/// Function result reported back when the user acted on a paused turn.
fn user_action_result(function_name: &str, server_id: &str, message: Option<String>) -> FunctionResult {
    FunctionResult {
        function_name: function_name.to_string(),
        function_args: json!({ "server_id": server_id }),
        result: json!({
            "type": function_name,
            "success": true,
            "server_id": server_id,
            "message": message.map(Value::String).unwrap_or(Value::Null),
        }),
    }
}

/// Tracks whether the last turn ended waiting on the user, so that a
/// successful `/add` or `/credentials` can hand the result back to it.
#[derive(Debug, Default)]
pub struct PausedTurn {
    awaiting: bool,
}

impl PausedTurn {
    pub fn is_awaiting(&self) -> bool {
        self.awaiting
    }

    pub fn record(&mut self, outcome: TurnOutcome) {
        self.awaiting = outcome == TurnOutcome::AwaitingUser;
    }

    pub fn clear(&mut self) {
        self.awaiting = false;
    }

    /// Send `result` back when the last turn is waiting on the user. Returns
    /// the outcome of the resumed turn, or `None` when nothing was waiting.
    pub async fn resume<B, O>(
        &mut self,
        client: &ChatClient<B>,
        session: &mut SessionContext,
        result: FunctionResult,
        observer: &mut O,
    ) -> Option<TurnOutcome>
    where
        B: Backend,
        O: TurnObserver + ?Sized,
    {
        if !self.awaiting {
            return None;
        }
        let outcome = client
            .continue_with_results(session, vec![result], observer)
            .await;
        self.record(outcome);
        Some(outcome)
    }
}

fn prompt() -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}

pub async fn run_chat(context: &mut CliContext) -> Result<(), Box<dyn Error>> {
    println!(
        "Connected to {} (session {}, transcript log {}). Type /help for commands.",
        context.client.backend().base_url(),
        context.session.session_id(),
        context.transcript.get_status_string()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut paused = PausedTurn::default();

    loop {
        prompt()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Invalid(hint) => eprintln!("{hint}"),
            ReplCommand::Message(text) => {
                let mut display = TerminalDisplay::stdout(&context.transcript);
                let outcome = context
                    .client
                    .send_message(&mut context.session, &text, &mut display)
                    .await;
                report_outcome(outcome);
                paused.record(outcome);
            }
            ReplCommand::Servers => match context.client.refresh_servers(&mut context.session).await {
                Ok(servers) => println!("{}", format_servers(servers)),
                Err(err) => eprintln!("❌ {err}"),
            },
            ReplCommand::Add(server) => {
                match context.client.add_server(&mut context.session, &server).await {
                    Ok(message) => {
                        println!("✅ {}", message.as_deref().unwrap_or("Server added"));
                        let result = user_action_result("add_server", &server, message);
                        resume(context, &mut paused, result).await;
                    }
                    Err(err) => eprintln!("❌ Failed to add {server}: {err}"),
                }
            }
            ReplCommand::Credentials(server) => {
                match collect_and_submit(context, &server, &mut lines).await {
                    Ok(Some(message)) => {
                        println!("✅ {message}");
                        let result =
                            user_action_result("submit_credentials", &server, Some(message));
                        resume(context, &mut paused, result).await;
                    }
                    Ok(None) => {}
                    Err(err) => eprintln!("❌ {err}"),
                }
            }
            ReplCommand::Invoke {
                server,
                tool,
                arguments,
            } => match parse_arguments(arguments.as_deref()) {
                Ok(arguments) => {
                    let mut progress = InvocationProgress::new(io::stdout());
                    context
                        .client
                        .invoke_tool(&mut context.session, &server, &tool, &arguments, |invocation| {
                            progress.update(invocation)
                        })
                        .await;
                    if let Some(message) = context.session.last_message() {
                        if let Err(err) = context.transcript.log_message(message) {
                            eprintln!("⚠️  {err}");
                        }
                    }
                }
                Err(err) => eprintln!("❌ {err}"),
            },
            ReplCommand::Log(Some(path)) => match context.transcript.set_log_file(path) {
                Ok(status) => println!("{status}"),
                Err(err) => eprintln!("❌ {err}"),
            },
            ReplCommand::Log(None) => match context.transcript.toggle_logging() {
                Ok(status) => println!("{status}"),
                Err(err) => eprintln!("{err}"),
            },
            ReplCommand::Reset => match context.session.reset() {
                Ok(()) => {
                    paused.clear();
                    println!("🔄 New session {}", context.session.session_id());
                }
                Err(err) => eprintln!("❌ {err}"),
            },
        }
    }

    Ok(())
}

async fn resume(context: &mut CliContext, paused: &mut PausedTurn, result: FunctionResult) {
    let mut display = TerminalDisplay::stdout(&context.transcript);
    if let Some(outcome) = paused
        .resume(&context.client, &mut context.session, result, &mut display)
        .await
    {
        report_outcome(outcome);
    }
}

/// Print any notice for how a turn ended.
fn report_outcome(outcome: TurnOutcome) {
    if let Some(notice) = outcome_notice(outcome) {
        println!("{notice}");
    }
}

pub async fn run_say(context: &mut CliContext, prompt: Vec<String>) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: toolchat say <prompt>");
        std::process::exit(1);
    }

    let mut display = TerminalDisplay::stdout(&context.transcript);
    let outcome = context
        .client
        .send_message(&mut context.session, &prompt, &mut display)
        .await;
    report_outcome(outcome);

    match outcome {
        TurnOutcome::Failed => std::process::exit(1),
        TurnOutcome::Truncated => std::process::exit(2),
        _ => Ok(()),
    }
}

/// Read one line without its terminator; `None` at end of input. The value
/// is otherwise left as typed.
pub(crate) async fn read_line<R>(lines: &mut Lines<R>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    lines.next_line().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::{TurnEvent, TurnOptions};
    use crate::utils::test_utils::{FakeBackend, RecordedCall, StreamScript};

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            ReplCommand::parse("  what servers do I have?  "),
            ReplCommand::Message("what servers do I have?".to_string())
        );
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
    }

    #[test]
    fn slash_commands_parse_their_arguments() {
        assert_eq!(ReplCommand::parse("/servers"), ReplCommand::Servers);
        assert_eq!(
            ReplCommand::parse("/add github"),
            ReplCommand::Add("github".to_string())
        );
        assert_eq!(
            ReplCommand::parse("/credentials  weather "),
            ReplCommand::Credentials("weather".to_string())
        );
        assert_eq!(
            ReplCommand::parse("/invoke github search_issues {\"q\": \"bug label\"}"),
            ReplCommand::Invoke {
                server: "github".to_string(),
                tool: "search_issues".to_string(),
                arguments: Some("{\"q\": \"bug label\"}".to_string()),
            }
        );
        assert_eq!(
            ReplCommand::parse("/invoke github list"),
            ReplCommand::Invoke {
                server: "github".to_string(),
                tool: "list".to_string(),
                arguments: None,
            }
        );
        assert_eq!(ReplCommand::parse("/log"), ReplCommand::Log(None));
        assert_eq!(
            ReplCommand::parse("/log chat.txt"),
            ReplCommand::Log(Some("chat.txt".to_string()))
        );
        assert_eq!(ReplCommand::parse("/exit"), ReplCommand::Quit);
    }

    #[test]
    fn malformed_commands_carry_usage() {
        assert_eq!(
            ReplCommand::parse("/add"),
            ReplCommand::Invalid("Usage: /add <server>".to_string())
        );
        assert_eq!(
            ReplCommand::parse("/add two words"),
            ReplCommand::Invalid("Usage: /add <server>".to_string())
        );
        assert!(matches!(
            ReplCommand::parse("/invoke github"),
            ReplCommand::Invalid(_)
        ));
        assert!(matches!(ReplCommand::parse("/theme"), ReplCommand::Invalid(hint) if hint.contains("/theme")));
    }

    #[test]
    fn user_action_result_names_the_server() {
        let result = user_action_result("add_server", "github", Some("Added".to_string()));
        assert_eq!(result.function_args, json!({"server_id": "github"}));
        assert_eq!(result.result["type"], "add_server");
        assert_eq!(result.result["message"], "Added");
    }

    #[tokio::test]
    async fn read_line_keeps_spacing_and_reports_eof() {
        let mut lines = BufReader::new(&b"  value \r\n"[..]).lines();
        assert_eq!(read_line(&mut lines).await.unwrap().as_deref(), Some("  value "));
        assert_eq!(read_line(&mut lines).await.unwrap(), None);
    }

    const RECOMMENDATION: &str = r#"{"type":"function_call","function_name":"recommend_servers","function_args":{},"function_result":{"type":"mcp_recommendations","servers":["github"]}}"#;

    fn ignore(_: &TurnEvent, _: &SessionContext) {}

    #[tokio::test]
    async fn nothing_is_resumed_unless_the_turn_waits() {
        let client = ChatClient::new(FakeBackend::with_streams(Vec::new()), TurnOptions::default());
        let mut session = SessionContext::ephemeral("s1");
        let mut paused = PausedTurn::default();
        paused.record(TurnOutcome::Completed);

        let outcome = paused
            .resume(
                &client,
                &mut session,
                user_action_result("add_server", "github", None),
                &mut ignore,
            )
            .await;

        assert_eq!(outcome, None);
        assert!(client.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn successful_action_resumes_a_waiting_turn_once() {
        let client = ChatClient::new(
            FakeBackend::with_streams(vec![
                StreamScript::frames(&[RECOMMENDATION, "[DONE]"]),
                StreamScript::frames(&[r#"{"type":"text","content":"GitHub is ready."}"#, "[DONE]"]),
            ]),
            TurnOptions::default(),
        );
        let mut session = SessionContext::ephemeral("s1");
        let mut paused = PausedTurn::default();

        let outcome = client
            .send_message(&mut session, "I need github", &mut ignore)
            .await;
        paused.record(outcome);
        assert!(paused.is_awaiting());

        let result = user_action_result("add_server", "github", Some("Added github".to_string()));
        let outcome = paused
            .resume(&client, &mut session, result.clone(), &mut ignore)
            .await;

        assert_eq!(outcome, Some(TurnOutcome::Completed));
        assert!(!paused.is_awaiting());
        match client.backend().function_result_calls().as_slice() {
            [RecordedCall::FunctionResults { results, .. }] => assert_eq!(results, &vec![result]),
            other => panic!("unexpected calls: {other:?}"),
        }
        assert_eq!(session.last_message().unwrap().content, "GitHub is ready.");

        let again = paused
            .resume(
                &client,
                &mut session,
                user_action_result("add_server", "github", None),
                &mut ignore,
            )
            .await;
        assert_eq!(again, None);
        assert_eq!(client.backend().function_result_calls().len(), 1);
    }

    #[test]
    fn reset_clears_a_waiting_turn() {
        let mut paused = PausedTurn::default();
        paused.record(TurnOutcome::AwaitingUser);
        paused.clear();
        assert!(!paused.is_awaiting());
    }
}
