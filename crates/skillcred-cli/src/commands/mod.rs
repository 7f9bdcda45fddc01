pub mod init;
pub mod issue;
pub mod revoke;
pub mod status;
pub mod submit;
pub mod sweep;
pub mod verify;

use serde::Deserialize;

/// Default API endpoint of a local node.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9101";

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Best-effort error message from a failed node response.
pub async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(err) => format!("HTTP {}: {}", status, err.error),
        Err(_) => format!("HTTP {}", status),
    }
}

pub fn unreachable(endpoint: &str, error: &reqwest::Error) {
    println!("Could not reach node at {}", endpoint);
    println!("  Error: {}", error);
    println!();
    println!("Is the node running? Start it with: skillcred-node");
}
