//! Line protocol standing in for the remote GATT client
//!
//! ```text
//! write <cell> <byte>... [@<offset>]
//! read <cell>
//! subscribe <cell> [notify|indicate|both]
//! unsubscribe <cell>
//! disconnect | status | quit
//! ```
//!
//! Bytes are decimal or `0x` hex. Blank lines and `#` comments are ignored.

use anyhow::{anyhow, bail, Context, Result};
use radar::gatt::Subscription;
use radar::Cell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Write { cell: Cell, data: Vec<u8>, offset: u16 },
    Read(Cell),
    Subscribe { cell: Cell, subscription: Subscription },
    Disconnect,
    Status,
    Quit,
}

fn parse_byte(token: &str) -> Result<u8> {
    let parsed = match token.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => token.parse(),
    };
    parsed.with_context(|| format!("'{}' is not a byte", token))
}

fn parse_cell(token: Option<&str>) -> Result<Cell> {
    let token = token.ok_or_else(|| anyhow!("missing cell name"))?;
    token.parse::<Cell>().map_err(|e| anyhow!(e))
}

/// Parse one input line. `Ok(None)` for lines with nothing to do.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.split('#').next().unwrap_or_default().trim();
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "write" | "w" => {
            let cell = parse_cell(tokens.next())?;
            let mut data = Vec::new();
            let mut offset = 0;
            for token in tokens {
                match token.strip_prefix('@') {
                    Some(off) => {
                        offset = off
                            .parse()
                            .with_context(|| format!("'{}' is not an offset", off))?
                    }
                    None => data.push(parse_byte(token)?),
                }
            }
            Command::Write { cell, data, offset }
        }
        "read" | "r" => Command::Read(parse_cell(tokens.next())?),
        "subscribe" | "sub" => {
            let cell = parse_cell(tokens.next())?;
            let subscription = match tokens.next().unwrap_or("notify") {
                "notify" => Subscription::NOTIFY,
                "indicate" => Subscription::INDICATE,
                "both" => Subscription::NOTIFY | Subscription::INDICATE,
                other => bail!("unknown subscription kind '{}'", other),
            };
            Command::Subscribe { cell, subscription }
        }
        "unsubscribe" | "unsub" => Command::Subscribe {
            cell: parse_cell(tokens.next())?,
            subscription: Subscription::empty(),
        },
        "disconnect" => Command::Disconnect,
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{}'", other),
    };
    Ok(Some(command))
}
