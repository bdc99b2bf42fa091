use crate::error::{NadError, Result};
use crate::types::Zone;
use std::fmt;

/// Line terminator written after every request
pub const REQUEST_TERMINATOR: char = '\r';

/// Request line that asks the device to dump every setting
pub const STATUS_ALL_REQUEST: &str = "?";

/// Controls addressable per zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Model,
    Power,
    Source,
    Volume,
    Mute,
    ListeningMode,
}

impl Control {
    fn wire_name(&self) -> &'static str {
        match self {
            Control::Model => "Model",
            Control::Power => "Power",
            Control::Source => "Source",
            Control::Volume => "Volume",
            Control::Mute => "Mute",
            Control::ListeningMode => "ListeningMode",
        }
    }
}

/// A device parameter: a control on a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub zone: Zone,
    pub control: Control,
}

impl Parameter {
    pub fn new(zone: Zone, control: Control) -> Self {
        Self { zone, control }
    }

    pub fn model() -> Self {
        Self::new(Zone::Main, Control::Model)
    }

    /// Name used on the wire, e.g. `Zone2.Volume`
    pub fn wire_name(&self) -> String {
        self.to_string()
    }

    /// Name used in the status table, e.g. `zone2_volume`
    pub fn key(&self) -> String {
        normalize_key(&self.wire_name())
    }

    /// Whether the device accepts this parameter at all
    fn validate(&self) -> Result<()> {
        match (self.zone, self.control) {
            (Zone::Zone2, Control::ListeningMode) => Err(NadError::InvalidRequest(
                "listening mode is only available on the main zone".to_string(),
            )),
            (Zone::Zone2, Control::Model) => Err(NadError::InvalidRequest(
                "model is only available on the main zone".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.zone.wire_prefix(), self.control.wire_name())
    }
}

/// Request operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Query,
    Set,
    Increment,
    Decrement,
}

impl Operator {
    pub fn symbol(&self) -> char {
        match self {
            Operator::Query => '?',
            Operator::Set => '=',
            Operator::Increment => '+',
            Operator::Decrement => '-',
        }
    }
}

/// One logical command
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub parameter: Parameter,
    pub operator: Operator,
    pub argument: Option<String>,
}

impl Request {
    pub fn new(parameter: Parameter, operator: Operator) -> Self {
        Self {
            parameter,
            operator,
            argument: None,
        }
    }

    pub fn query(parameter: Parameter) -> Self {
        Self::new(parameter, Operator::Query)
    }

    pub fn set(parameter: Parameter, argument: impl ToString) -> Self {
        Self::new(parameter, Operator::Set).with_argument(argument)
    }

    pub fn with_argument(mut self, argument: impl ToString) -> Self {
        self.argument = Some(argument.to_string());
        self
    }

    /// Check the request against the parameter's accepted operators
    pub fn validate(&self) -> Result<()> {
        self.parameter.validate()?;
        match self.operator {
            Operator::Set => {
                let arg = self.argument.as_deref().map(str::trim).unwrap_or_default();
                if arg.is_empty() {
                    return Err(NadError::InvalidRequest(format!(
                        "{} requires an argument",
                        self.parameter
                    )));
                }
                if arg.contains(['\r', '\n']) {
                    return Err(NadError::InvalidRequest(format!(
                        "argument for {} contains a line break",
                        self.parameter
                    )));
                }
                if self.parameter.control == Control::Model {
                    return Err(NadError::InvalidRequest("model is read-only".to_string()));
                }
            }
            Operator::Increment | Operator::Decrement => {
                if self.parameter.control != Control::Volume {
                    return Err(NadError::InvalidRequest(format!(
                        "relative steps are only supported for volume, not {}",
                        self.parameter
                    )));
                }
            }
            Operator::Query => {}
        }
        Ok(())
    }

    /// Render the request line including its terminator
    pub fn encode(&self) -> Result<String> {
        self.validate()?;
        let mut line = self.parameter.wire_name();
        line.push(self.operator.symbol());
        if self.operator == Operator::Set {
            if let Some(arg) = &self.argument {
                line.push_str(arg.trim());
            }
        }
        line.push(REQUEST_TERMINATOR);
        Ok(line)
    }
}

/// A parsed `Key=value` reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    pub key: String,
    pub value: String,
}

impl ReplyLine {
    /// Parse one reply line; surrounding whitespace and `\r` are ignored
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| NadError::Protocol(format!("reply without '=': {:?}", line)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(NadError::Protocol(format!("reply without parameter: {:?}", line)));
        }
        Ok(Self {
            key: key.to_string(),
            value: value.trim().to_string(),
        })
    }

    /// Whether this line answers the given parameter
    pub fn answers(&self, parameter: &Parameter) -> bool {
        self.key.eq_ignore_ascii_case(&parameter.wire_name())
    }
}

/// Match a reply line to a request.
///
/// Returns `Ok(None)` for lines about other parameters, which the device emits
/// on its own whenever state changes.
pub fn pair_reply(request: &Request, line: &str) -> Result<Option<String>> {
    let reply = ReplyLine::parse(line)?;
    if !reply.answers(&request.parameter) {
        return Ok(None);
    }
    if reply.value.is_empty() {
        return Err(NadError::Rejected {
            parameter: request.parameter.wire_name(),
            value: request.argument.clone(),
        });
    }
    Ok(Some(reply.value))
}

/// `Main.Volume.Min` -> `main_volume_min`
pub fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace('.', "_")
}

/// Accept model strings that start with a letter and carry a number, e.g. `C368`
pub fn is_model_name(reply: &str) -> bool {
    let word: Vec<char> = reply
        .trim()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    word.first().is_some_and(|c| c.is_alphabetic()) && word.iter().skip(1).any(|c| c.is_ascii_digit())
}
