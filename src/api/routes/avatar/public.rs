use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct SpeakRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct AvatarActionResponse {
    pub success: bool,
}
