use serde::Serialize;

/// Closed set of message type codes. Value 4 belonged to the retired urgent
/// callback type; the gap is load-bearing history and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    General = 0,
    Dosage = 1,
    Dietary = 2,
    Feedback = 3,
    Callback = 5,
    ActivationCode = 6,
    RedAlert = 7,
    AmberAlert = 8,
    GreyAlert = 9,
    ClearAlerts = 10,
}

impl MessageType {
    /// Alert types are a clinician broadcast mechanism and are filtered out
    /// of general sender-or-receiver listings.
    pub const ALERTS: [MessageType; 3] = [
        MessageType::RedAlert,
        MessageType::AmberAlert,
        MessageType::GreyAlert,
    ];

    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(MessageType::General),
            1 => Some(MessageType::Dosage),
            2 => Some(MessageType::Dietary),
            3 => Some(MessageType::Feedback),
            5 => Some(MessageType::Callback),
            6 => Some(MessageType::ActivationCode),
            7 => Some(MessageType::RedAlert),
            8 => Some(MessageType::AmberAlert),
            9 => Some(MessageType::GreyAlert),
            10 => Some(MessageType::ClearAlerts),
            _ => None,
        }
    }

    pub fn value(self) -> i32 {
        self as i32
    }

    pub fn is_alert(self) -> bool {
        Self::ALERTS.contains(&self)
    }
}

/// Wire shape of a message type reference: `{"value": n}`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MessageTypeDto {
    pub value: i32,
}

impl From<MessageType> for MessageTypeDto {
    fn from(mt: MessageType) -> Self {
        MessageTypeDto { value: mt.value() }
    }
}
