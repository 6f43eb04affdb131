//! Line-oriented operator console.
//!
//! A thin stand-in for a kiosk UI: it renders [`Prompt`]s as text and turns
//! typed lines into engine calls. It holds no business rules.

use crate::engine::{CheckInEngine, Outcome, Prompt, StatusClass};
use gatecheck_core::ticket::Ticket;
use gatecheck_runtime::StoreError;
use std::fmt::Write as _;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Console failures.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Reading input or writing output failed.
    #[error("Console I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine stopped accepting input.
    #[error(transparent)]
    Engine(#[from] StoreError),
}

/// Drive `engine` from `input` until end of input or `quit`.
///
/// At the code prompt a line is a ticket code, a search text, `REFRESH`, or
/// `#N` to check in the N-th search result. An empty line at the wristband
/// prompt abandons it. End of input abandons any open wristband prompt.
/// Results of a `REFRESH` are printed when they arrive, whatever the prompt.
///
/// # Errors
///
/// - [`ConsoleError::Io`]: the terminal went away
/// - [`ConsoleError::Engine`]: the engine was shut down underneath the console
pub async fn run<R, W>(engine: &CheckInEngine, input: R, mut output: W) -> Result<(), ConsoleError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut notices = engine.notices();
    let mut prompt = engine.refresh_totals().await?;
    output.write_all(b"Ready to scan\n").await?;
    describe(&mut output, &prompt).await?;

    loop {
        output.write_all(question(&prompt).as_bytes()).await?;
        output.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(outcome) = notices.next() => {
                let notice = format!("\n[{}] {outcome}\n", status_tag(&outcome));
                output.write_all(notice.as_bytes()).await?;
                if matches!(prompt, Prompt::Ready { .. }) {
                    prompt = engine.prompt().await;
                }
                continue;
            }
        };
        let Some(line) = line else {
            if matches!(prompt, Prompt::Wristband { .. }) {
                engine.abandon().await?;
            }
            break;
        };
        let line = line.trim();

        prompt = match &prompt {
            Prompt::Ready { results, .. } => {
                if matches!(line, "quit" | "exit") {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                if let Some(index) = line.strip_prefix('#') {
                    match pick(results, index) {
                        Some(ticket) => engine.select(ticket.id).await?,
                        None => {
                            output.write_all(b"No such search result\n").await?;
                            continue;
                        }
                    }
                } else {
                    engine.submit(line).await?
                }
            }
            Prompt::ConfirmDuplicate(_) => engine.resume_duplicate(is_yes(line)).await?,
            Prompt::Review(_) => engine.resume_review(is_yes(line)).await?,
            Prompt::Wristband { .. } if line.is_empty() => engine.abandon().await?,
            Prompt::Wristband { .. } => engine.resume_wristband(line).await?,
        };
        describe(&mut output, &prompt).await?;
    }

    output.flush().await?;
    Ok(())
}

fn pick<'a>(results: &'a [Ticket], index: &str) -> Option<&'a Ticket> {
    let index: usize = index.trim().parse().ok()?;
    results.get(index.checked_sub(1)?)
}

fn is_yes(line: &str) -> bool {
    matches!(line.to_ascii_lowercase().as_str(), "y" | "yes")
}

fn question(prompt: &Prompt) -> &'static str {
    match prompt {
        Prompt::Ready { .. } => "code> ",
        Prompt::ConfirmDuplicate(_) => "Ticket already used! Are you replacing a wristband? [y/N] ",
        Prompt::Review(_) => "Accept? [y/N] ",
        Prompt::Wristband { .. } => "wristband> ",
    }
}

fn status_tag(outcome: &Outcome) -> &'static str {
    match outcome.status() {
        StatusClass::Accept => "ACCEPT",
        StatusClass::Reject => "REJECT",
        StatusClass::Error => "ERROR",
    }
}

async fn describe<W: AsyncWrite + Unpin>(output: &mut W, prompt: &Prompt) -> std::io::Result<()> {
    let mut text = String::new();
    // Writing into a String cannot fail
    let _ = match prompt {
        Prompt::Ready {
            outcome,
            search,
            results,
            totals,
        } => {
            if let Some(outcome) = outcome {
                let _ = writeln!(text, "[{}] {outcome}", status_tag(outcome));
            }
            if search.is_some() && results.is_empty() {
                let _ = writeln!(text, "No Results!");
            }
            for (n, ticket) in results.iter().enumerate() {
                let _ = writeln!(text, "  #{} {}", n + 1, ticket.summary());
            }
            writeln!(text, "Sold: {}  Used: {}", totals.sold, totals.used)
        }
        Prompt::ConfirmDuplicate(review) | Prompt::Review(review) => writeln!(text, "\n{review}\n"),
        Prompt::Wristband { rejection } => match rejection {
            Some(reason) => writeln!(text, "{reason}"),
            None => Ok(()),
        },
    };
    output.write_all(text.as_bytes()).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use crate::context::AppContext;
    use gatecheck_testing::fixtures::ticket;
    use gatecheck_testing::{InMemoryTicketStore, test_clock};
    use std::sync::Arc;
    use tokio::io::BufReader;

    fn engine(store: &InMemoryTicketStore) -> CheckInEngine {
        CheckInEngine::new(AppContext::new(test_clock(), Arc::new(store.clone()), None))
    }

    async fn session(store: &InMemoryTicketStore, typed: &[&[u8]]) -> String {
        let mut input = tokio_test::io::Builder::new();
        for chunk in typed {
            input.read(chunk);
        }
        let mut output = Vec::new();
        run(&engine(store), BufReader::new(input.build()), &mut output)
            .await
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn operator_checks_in_a_ticket() {
        let store = InMemoryTicketStore::with_tickets([ticket(1, "2003456789").build()]);

        let transcript = session(&store, &[b"2003456789\n", b"y\n", b"100\n"]).await;

        assert!(transcript.contains("#### CHECK ID WITH INFORMATION BELOW ####"));
        assert!(transcript.contains("[ACCEPT] Ticket accepted"));
        assert!(transcript.contains("Sold: 1  Used: 1"));
        assert_eq!(store.checkins().len(), 1);
    }

    #[tokio::test]
    async fn search_result_can_be_picked_by_number() {
        let store = InMemoryTicketStore::with_tickets([
            ticket(1, "2003456789").waiver("Ada", "Lovelace").build(),
        ]);

        let transcript = session(&store, &[b"lovelace\n", b"#1\n", b"n\n", b"quit\n"]).await;

        assert!(transcript.contains("  #1 2003456789 - Lovelace, Ada"));
        assert!(transcript.contains("Name: Lovelace, Ada"));
        assert!(transcript.contains("[REJECT] Cancelled"));
        assert!(store.checkins().is_empty());
    }

    #[tokio::test]
    async fn empty_search_says_so() {
        let store = InMemoryTicketStore::with_tickets([
            ticket(1, "2003456789").waiver("Ada", "Lovelace").build(),
        ]);

        let transcript = session(&store, &[b"hopper\n", b"quit\n"]).await;

        assert!(transcript.contains("No Results!"));
        let before_search = transcript.split("code> ").next().unwrap();
        assert!(!before_search.contains("No Results!"));
    }

    #[tokio::test]
    async fn end_of_input_abandons_open_wristband_prompt() {
        let store = InMemoryTicketStore::with_tickets([ticket(1, "2003456789").build()]);

        let transcript = session(&store, &[b"2003456789\n", b"yes\n", b"abc\n"]).await;

        assert!(transcript.contains("Wristband ID must be a number"));
        assert!(store.checkins().is_empty());
    }

    #[test]
    fn picks_are_one_based() {
        let results = vec![ticket(1, "2003456789").build(), ticket(2, "1000010001").build()];
        assert_eq!(pick(&results, "2").map(|t| t.id.0), Some(2));
        assert!(pick(&results, "0").is_none());
        assert!(pick(&results, "3").is_none());
        assert!(pick(&results, "x").is_none());
    }
}
