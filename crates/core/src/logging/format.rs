use std::fmt::{self, Write as _};
use std::path::Path;
use std::thread;

use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Renders events through a `%(name)s` style log line template.
///
/// Recognised attributes: `asctime`, `name` (the event target), `levelname`,
/// `levelno`, `message`, `process`, `thread`, `threadName`, `module`,
/// `filename`, `pathname`, `lineno`. `%%` is a literal percent sign. A
/// placeholder with an unknown attribute is written out unchanged.
#[derive(Debug, Clone)]
pub struct LogLineFormat {
  pieces: Vec<Piece>,
  date_format: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
  Literal(String),
  Attr { attr: Attr, left: bool, width: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attr {
  AscTime,
  Name,
  LevelName,
  LevelNo,
  Message,
  Process,
  Thread,
  ThreadName,
  Module,
  FileName,
  PathName,
  LineNo,
}

impl Attr {
  fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "asctime" => Attr::AscTime,
      "name" => Attr::Name,
      "levelname" => Attr::LevelName,
      "levelno" => Attr::LevelNo,
      "message" => Attr::Message,
      "process" => Attr::Process,
      "thread" => Attr::Thread,
      "threadName" => Attr::ThreadName,
      "module" => Attr::Module,
      "filename" => Attr::FileName,
      "pathname" => Attr::PathName,
      "lineno" => Attr::LineNo,
      _ => return None,
    })
  }
}

impl LogLineFormat {
  /// `date_format` must already be a valid strftime pattern.
  #[must_use]
  pub fn new(template: &str, date_format: &str) -> Self {
    Self {
      pieces: parse_template(template),
      date_format: date_format.to_string(),
    }
  }
}

fn parse_template(template: &str) -> Vec<Piece> {
  let mut pieces = Vec::new();
  let mut literal = String::new();
  let mut rest = template;

  while let Some(pos) = rest.find('%') {
    literal.push_str(&rest[..pos]);
    rest = &rest[pos..];

    if let Some(after) = rest.strip_prefix("%%") {
      literal.push('%');
      rest = after;
      continue;
    }
    match parse_placeholder(rest) {
      Some((piece, consumed)) => {
        if !literal.is_empty() {
          pieces.push(Piece::Literal(std::mem::take(&mut literal)));
        }
        pieces.push(piece);
        rest = &rest[consumed..];
      }
      None => {
        // Not a placeholder we render; keep the whole token as text.
        let consumed = placeholder_len(rest).unwrap_or(1);
        literal.push_str(&rest[..consumed]);
        rest = &rest[consumed..];
      }
    }
  }
  literal.push_str(rest);
  if !literal.is_empty() {
    pieces.push(Piece::Literal(literal));
  }
  pieces
}

/// Length of a `%(attr)<flags><width><conversion>` token at the start of `s`.
fn placeholder_len(s: &str) -> Option<usize> {
  let inner = s.strip_prefix("%(")?;
  let close = inner.find(')')?;
  let tail = &inner[close + 1..];
  let flags = tail
    .find(|c: char| !(c == '-' || c == '0' || c == ' ' || c == '+' || c == '#' || c.is_ascii_digit() || c == '.'))?;
  let conversion = tail[flags..].chars().next()?;
  if !conversion.is_ascii_alphabetic() {
    return None;
  }
  Some(2 + close + 1 + flags + conversion.len_utf8())
}

fn parse_placeholder(s: &str) -> Option<(Piece, usize)> {
  let len = placeholder_len(s)?;
  let inner = &s[2..len];
  let close = inner.find(')')?;
  let attr = Attr::from_name(&inner[..close])?;
  let tail = &inner[close + 1..inner.len() - 1];
  let left = tail.contains('-');
  let width = tail
    .trim_start_matches(['-', '0', ' ', '+', '#'])
    .split('.')
    .next()
    .and_then(|w| w.parse().ok())
    .unwrap_or(0);
  Some((Piece::Attr { attr, left, width }, len))
}

fn level_name(level: &Level) -> &'static str {
  match *level {
    Level::ERROR => "ERROR",
    Level::WARN => "WARNING",
    Level::INFO => "INFO",
    Level::DEBUG => "DEBUG",
    Level::TRACE => "TRACE",
  }
}

fn level_no(level: &Level) -> u8 {
  match *level {
    Level::ERROR => 40,
    Level::WARN => 30,
    Level::INFO => 20,
    Level::DEBUG => 10,
    Level::TRACE => 5,
  }
}

#[derive(Default)]
struct MessageVisitor {
  message: String,
  fields: String,
}

impl Visit for MessageVisitor {
  fn record_str(&mut self, field: &Field, value: &str) {
    if field.name() == "message" {
      self.message.push_str(value);
    } else {
      let _ = write!(self.fields, " {}={}", field.name(), value);
    }
  }

  fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
    if field.name() == "message" {
      let _ = write!(self.message, "{value:?}");
    } else {
      let _ = write!(self.fields, " {}={value:?}", field.name());
    }
  }
}

impl<S, N> FormatEvent<S, N> for LogLineFormat
where
  S: Subscriber + for<'a> LookupSpan<'a>,
  N: for<'a> FormatFields<'a> + 'static,
{
  fn format_event(
    &self,
    _ctx: &FmtContext<'_, S, N>,
    mut writer: Writer<'_>,
    event: &Event<'_>,
  ) -> fmt::Result {
    let meta = event.metadata();
    let mut visitor = MessageVisitor::default();
    event.record(&mut visitor);

    let mut value = String::new();
    for piece in &self.pieces {
      let (attr, left, width) = match piece {
        Piece::Literal(text) => {
          writer.write_str(text)?;
          continue;
        }
        Piece::Attr { attr, left, width } => (*attr, *left, *width),
      };

      value.clear();
      match attr {
        Attr::AscTime => write!(value, "{}", Local::now().format(&self.date_format))?,
        Attr::Name => value.push_str(meta.target()),
        Attr::LevelName => value.push_str(level_name(meta.level())),
        Attr::LevelNo => write!(value, "{}", level_no(meta.level()))?,
        Attr::Message => {
          value.push_str(&visitor.message);
          value.push_str(&visitor.fields);
        }
        Attr::Process => write!(value, "{}", std::process::id())?,
        Attr::Thread => write!(value, "{}", unsafe { libc::pthread_self() } as usize)?,
        Attr::ThreadName => value.push_str(thread::current().name().unwrap_or("unnamed")),
        Attr::Module => value.push_str(module_name(meta.file(), meta.module_path())),
        Attr::FileName => value.push_str(
          meta
            .file()
            .and_then(|f| Path::new(f).file_name())
            .and_then(|f| f.to_str())
            .unwrap_or("?"),
        ),
        Attr::PathName => value.push_str(meta.file().unwrap_or("?")),
        Attr::LineNo => write!(value, "{}", meta.line().unwrap_or(0))?,
      }

      if left {
        write!(writer, "{value:<width$}")?;
      } else {
        write!(writer, "{value:>width$}")?;
      }
    }
    writeln!(writer)
  }
}

fn module_name<'a>(file: Option<&'a str>, module_path: Option<&'a str>) -> &'a str {
  file
    .and_then(|f| Path::new(f).file_stem())
    .and_then(|s| s.to_str())
    .or_else(|| module_path.and_then(|m| m.rsplit("::").next()))
    .unwrap_or("?")
}
