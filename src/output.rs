//! Output sinks for resolved records.

use snafu::{ResultExt, Snafu};
use std::io::Write;

use crate::context::Context;
use crate::message::Message;
use crate::record::Record;

/// Error writing a record.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum OutputError
{
    /// The underlying writer failed.
    #[snafu(display("Failed to write output: {}", source))]
    Io
    {
        /// Source error.
        source: std::io::Error,
    },
}

/// Destination for resolved records.
pub trait Output
{
    /// Called once before the first record.
    fn start(&mut self) -> Result<(), OutputError>;

    /// Adds one captured exchange. `records` holds the record followed by the records
    /// unwrapped from its proxy envelopes.
    fn add_record(
        &mut self,
        rpc_id: i64,
        rpc_status: i64,
        records: &[&Record],
    ) -> Result<(), OutputError>;
}

/// Writes records as text.
///
/// ```text
/// #7 [status 1] CLIENT_ACTION_PROXY_SOCIAL_ACTION
/// Request ProxyRequestProto: action: 42 payload: "abc"
/// Response ProxyResponseProto: status: 1 payload: "def"
/// > GET_INBOX
/// Request GetInboxProto [generic]: {"12":"..."}
/// Response GetInboxOutProto [generic]: {"12":"..."}
/// ```
pub struct TextOutput<'a, W>
{
    out: W,
    ctx: &'a Context,
    one_line: bool,
}

impl<'a, W: Write> TextOutput<'a, W>
{
    /// Creates a sink rendering values with types from `ctx`.
    pub fn new(out: W, ctx: &'a Context, one_line: bool) -> Self
    {
        TextOutput { out, ctx, one_line }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W
    {
        self.out
    }

    fn write_message(&mut self, msg: &Message) -> std::io::Result<()>
    {
        write!(self.out, "{}", msg.direction)?;
        if let Some(name) = &msg.schema_name {
            write!(self.out, " {}", name)?;
        }
        if msg.strict().is_none() {
            write!(self.out, " [generic]")?;
        }
        if !msg.is_complete() {
            write!(self.out, " [incomplete]")?;
        }

        let rendered = msg.render(self.ctx, self.one_line);
        match self.one_line {
            true => writeln!(self.out, ": {}", rendered),
            false => writeln!(self.out, ":\n{}", rendered.trim_end()),
        }
    }
}

impl<'a, W: Write> Output for TextOutput<'a, W>
{
    fn start(&mut self) -> Result<(), OutputError>
    {
        self.out.flush().context(Io)
    }

    fn add_record(
        &mut self,
        rpc_id: i64,
        rpc_status: i64,
        records: &[&Record],
    ) -> Result<(), OutputError>
    {
        for (idx, record) in records.iter().enumerate() {
            let method = match &record.method_name {
                Some(name) => name.clone(),
                None => record.method_value.to_string(),
            };

            let header = match idx {
                0 => writeln!(self.out, "#{} [status {}] {}", rpc_id, rpc_status, method),
                _ => writeln!(self.out, "> {}", method),
            };
            header.context(Io)?;

            for msg in record.messages() {
                self.write_message(msg).context(Io)?;
            }
        }

        if !self.one_line {
            writeln!(self.out).context(Io)?;
        }
        self.out.flush().context(Io)
    }
}
