//! Parses EIP-3155-style execution trace events (line-delimited JSON).

use serde::Deserialize;

use crate::error::Error;
use crate::hexstring::HexString;

#[derive(Debug, Clone, Deserialize)]
struct RawTraceEvent {
    pc: usize,
    op: u8,
    #[serde(default)]
    stack: Vec<String>,
    #[serde(default)]
    memory: Option<String>,
    depth: Option<usize>,
}

/// One post-state record from a trace. `stack` is normalized to "top first"
/// at ingest; the raw wire format lists the top last.
#[derive(Debug, Clone, Default)]
pub struct TraceEvent {
    pub pc: usize,
    pub op: u8,
    pub stack: Vec<HexString>,
    pub memory: HexString,
    pub depth: Option<usize>,
}

impl TraceEvent {
    pub fn parse_line(line: &str) -> Result<TraceEvent, Error> {
        let raw: RawTraceEvent =
            serde_json::from_str(line).map_err(|e| Error::MalformedTraceEvent(e.to_string()))?;

        let mut stack = Vec::with_capacity(raw.stack.len());
        for entry in &raw.stack {
            stack.push(
                HexString::new(entry)
                    .map_err(|_| Error::MalformedTraceEvent(format!("bad stack entry: {entry}")))?,
            );
        }
        // Wire format lists the stack top last; this crate works top-first throughout.
        stack.reverse();

        let memory = match raw.memory {
            Some(m) if !m.is_empty() => {
                HexString::new(&m).map_err(|_| Error::MalformedTraceEvent(format!("bad memory: {m}")))?
            }
            _ => HexString::zeros(0),
        };

        Ok(TraceEvent { pc: raw.pc, op: raw.op, stack, memory, depth: raw.depth })
    }
}

/// Parses every non-blank line of `reader` as one [`TraceEvent`].
pub fn parse_trace<R: std::io::BufRead>(reader: R) -> Result<Vec<TraceEvent>, Error> {
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| Error::MalformedTraceEvent(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(TraceEvent::parse_line(&line)?);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_normal_event_with_stack_reversed_to_top_first() {
        let event = TraceEvent::parse_line(
            r#"{"pc":0,"op":96,"stack":["0x2","0x3"],"memory":"0x","depth":1}"#,
        )
        .unwrap();

        assert_eq!(event.pc, 0);
        assert_eq!(event.op, 96);
        assert_eq!(event.stack[0], HexString::new("0x3").unwrap());
        assert_eq!(event.stack[1], HexString::new("0x2").unwrap());
        assert_eq!(event.depth, Some(1));
    }

    #[test]
    fn final_event_has_no_depth() {
        let event = TraceEvent::parse_line(r#"{"pc":5,"op":0,"stack":[],"memory":null,"depth":null}"#).unwrap();
        assert_eq!(event.depth, None);
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = TraceEvent::parse_line("not json").unwrap_err();
        assert!(matches!(err, Error::MalformedTraceEvent(_)));
    }

    #[test]
    fn parse_trace_skips_blank_lines() {
        let input = "{\"pc\":0,\"op\":0,\"stack\":[],\"memory\":null,\"depth\":1}\n\n{\"pc\":1,\"op\":0,\"stack\":[],\"memory\":null,\"depth\":null}\n";
        let events = parse_trace(input.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
    }
}
