//! RFC 5322 message construction for the Gmail `raw` field.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use lettre::Message;
use lettre::message::{Mailbox, SinglePart};

use crate::error::DispatchError;
use crate::pipeline::types::EmailCommand;

/// Build the plain-text message for `cmd`, sent from `sender`.
///
/// Header folding, RFC 2047 encoded words and the body transfer encoding
/// are left to lettre. CR/LF in the subject is flattened first so model
/// output cannot start a new header.
pub fn build_message(sender: &str, cmd: &EmailCommand) -> Result<Message, DispatchError> {
    let from: Mailbox = sender.parse().map_err(|e| DispatchError::InvalidMessage {
        reason: format!("invalid sender address: {e}"),
    })?;
    let to: Mailbox = cmd
        .recipient()
        .parse()
        .map_err(|e| DispatchError::InvalidMessage {
            reason: format!("invalid recipient address: {e}"),
        })?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(single_line(cmd.subject()))
        .singlepart(SinglePart::plain(normalize_body(cmd.body())))
        .map_err(|e| DispatchError::InvalidMessage {
            reason: format!("failed to build email: {e}"),
        })
}

/// URL-safe base64 without padding, as Gmail expects for `raw`.
pub fn encode_raw(message: &Message) -> String {
    URL_SAFE_NO_PAD.encode(message.formatted())
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ").trim().to_string()
}

fn normalize_body(body: &str) -> String {
    body.replace("\r\n", "\n").replace('\r', "\n").replace('\n', "\r\n")
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD;

    use super::*;

    fn cmd(subject: &str, body: &str) -> EmailCommand {
        EmailCommand::new("bob@example.com", subject, body).unwrap()
    }

    fn formatted(subject: &str, body: &str) -> String {
        let message = build_message("me@example.com", &cmd(subject, body)).unwrap();
        String::from_utf8(message.formatted()).unwrap()
    }

    /// Header block with folded continuation lines joined back up.
    fn header_lines(message: &str) -> Vec<String> {
        let (headers, _) = message.split_once("\r\n\r\n").unwrap();
        let mut lines: Vec<String> = Vec::new();
        for line in headers.split("\r\n") {
            match lines.last_mut() {
                Some(last) if line.starts_with([' ', '\t']) => last.push_str(line),
                _ => lines.push(line.to_string()),
            }
        }
        lines
    }

    fn subject_header(message: &str) -> String {
        header_lines(message)
            .into_iter()
            .find(|l| l.starts_with("Subject:"))
            .unwrap()
    }

    #[test]
    fn message_has_addresses_subject_and_body() {
        let message = formatted("Meeting update", "Moved to 3pm.");
        let lower = message.to_lowercase();

        assert!(message.contains("From: me@example.com\r\n"));
        assert!(message.contains("To: bob@example.com\r\n"));
        assert!(message.contains("Subject: Meeting update\r\n"));
        assert!(message.contains("MIME-Version: 1.0\r\n"));
        assert!(lower.contains("content-type: text/plain; charset=utf-8\r\n"));
        assert!(lower.contains("content-transfer-encoding: 7bit\r\n"));
        assert!(message.ends_with("\r\n\r\nMoved to 3pm."));
    }

    #[test]
    fn subject_newlines_cannot_inject_headers() {
        let message = formatted("Hi\r\nBcc: eve@example.com", "b");

        assert!(subject_header(&message).starts_with("Subject: Hi"));
        assert!(!header_lines(&message).iter().any(|l| l.starts_with("Bcc:")));
    }

    #[test]
    fn unparseable_recipient_is_an_invalid_message() {
        // Passes the extraction syntax check but is not a valid mailbox.
        let cmd = EmailCommand::new("bob\"quote@example.com", "s", "b").unwrap();
        assert!(matches!(
            build_message("me@example.com", &cmd),
            Err(DispatchError::InvalidMessage { .. })
        ));
    }

    #[test]
    fn long_non_ascii_subject_uses_short_encoded_words() {
        let message = formatted(&"Réunion ".repeat(20), "b");
        let subject = subject_header(&message);

        assert!(subject.is_ascii());
        assert!(subject.to_lowercase().contains("=?utf-8?"));
        for word in subject.split_whitespace().filter(|w| w.starts_with("=?")) {
            assert!(word.len() <= 75, "encoded word too long: {}", word.len());
        }
    }

    #[test]
    fn long_subject_is_folded() {
        let message = formatted(&"Quarterly status report ".repeat(50), "b");
        let (headers, _) = message.split_once("\r\n\r\n").unwrap();

        assert!(headers.split("\r\n").all(|l| l.len() <= 998));
        assert!(subject_header(&message).contains("Quarterly status report"));
    }

    #[test]
    fn non_ascii_body_declares_transfer_encoding() {
        let message = formatted("Lunch", "À 15h.\nMerci");
        let lower = message.to_lowercase();

        assert!(message.is_ascii());
        assert!(lower.contains("content-transfer-encoding: "));
        assert!(!lower.contains("content-transfer-encoding: 7bit"));
    }

    #[test]
    fn body_line_endings_become_crlf() {
        let message = formatted("s", "line one\nline two\r\nline three");
        assert!(message.ends_with("line one\r\nline two\r\nline three"));
    }

    #[test]
    fn raw_encoding_is_url_safe_and_unpadded() {
        // Six '?' or '>' in a row always hold an aligned "???" ("Pz8/") or
        // ">>>" ("Pj4+") group, whatever the header length.
        let message = build_message("me@example.com", &cmd("s", "??????>>>>>> x")).unwrap();
        let bytes = message.formatted();
        assert!(STANDARD.encode(&bytes).contains(['+', '/']));

        let raw = encode_raw(&message);
        assert!(!raw.contains(['+', '/', '=']));
        assert_eq!(URL_SAFE_NO_PAD.decode(&raw).unwrap(), bytes);
    }
}
