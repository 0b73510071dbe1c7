//! Binary entrypoint for the line-oriented chatbot client.

use std::process::ExitCode;

use chatbot_client::start_chat_client;

/// Start the client against the backend configured via `CHATBOT_*` env vars.
fn main() -> ExitCode {
    start_chat_client::run()
}
