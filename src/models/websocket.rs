use serde::{ Serialize, Deserialize };
use super::chat::{ ModelName, Turn };

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
        model: ModelName,
    },
    #[serde(rename = "transcript")]
    Transcript,
    #[serde(rename = "models")]
    Models,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "models")] Models {
        models: Vec<ModelName>,
    },
    #[serde(rename = "warning")] Warning {
        message: String,
    },
    #[serde(rename = "typing")]
    Typing,
    #[serde(rename = "partial")] Partial {
        content: String,
    },
    #[serde(rename = "done")] Done {
        timestamp: i64,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
    #[serde(rename = "transcript")] Transcript {
        turns: Vec<Turn>,
    },
}
