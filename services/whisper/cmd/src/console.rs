//! Line commands read from stdin.

use std::str::FromStr;
use whisper_session::SessionId;

pub const HELP: &str = "\
Commands:
  help, ?                 show this help
  sessions                list established sessions
  send <id> <message>     send a message on a session
  connect <address>       start a handshake with host:port
  quit                    close the endpoint and exit";

/// A parsed console line
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Empty,
    Help,
    Sessions,
    Send { session_id: SessionId, message: String },
    Connect(String),
    Quit,
}

impl FromStr for Input {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim_start()),
            None => (line, ""),
        };

        match command {
            "" => Ok(Input::Empty),
            "help" | "?" => Ok(Input::Help),
            "sessions" => Ok(Input::Sessions),
            "quit" | "exit" => Ok(Input::Quit),
            "connect" => {
                if rest.is_empty() {
                    return Err("usage: connect <address>".to_string());
                }
                Ok(Input::Connect(rest.to_string()))
            }
            "send" => {
                let (id, message) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: send <id> <message>".to_string())?;
                let session_id = id
                    .parse::<SessionId>()
                    .map_err(|_| format!("invalid session id: {}", id))?;
                Ok(Input::Send {
                    session_id,
                    message: message.trim_start().to_string(),
                })
            }
            other => Err(format!("unknown command: {} (try help)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!("".parse::<Input>().unwrap(), Input::Empty);
        assert_eq!("  ?  ".parse::<Input>().unwrap(), Input::Help);
        assert_eq!("sessions".parse::<Input>().unwrap(), Input::Sessions);
        assert_eq!("quit".parse::<Input>().unwrap(), Input::Quit);
        assert_eq!(
            "connect 10.0.0.2:3030".parse::<Input>().unwrap(),
            Input::Connect("10.0.0.2:3030".to_string())
        );
    }

    #[test]
    fn test_send_keeps_message_spacing() {
        let id = SessionId::random();
        let line = format!("send {}   hello  there", id);
        assert_eq!(
            line.parse::<Input>().unwrap(),
            Input::Send {
                session_id: id,
                message: "hello  there".to_string(),
            }
        );
    }

    #[test]
    fn test_bad_input() {
        assert!("connect".parse::<Input>().is_err());
        assert!("send abc hello".parse::<Input>().is_err());
        assert!(format!("send {}", SessionId::random()).parse::<Input>().is_err());
        assert!("dance".parse::<Input>().is_err());
    }
}
