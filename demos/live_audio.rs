use gemini_live::{PcmFormat, types::Modality};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "response.wav".into());

    let client = gemini_live::Client::from_env()?;
    let mut connect = client.live("gemini-2.0-flash-exp");
    connect.response_modalities(vec![Modality::Audio]);
    let mut session = connect.await?;

    let turn = match session
        .ask("Hello! Can you tell me a short story about a peaceful garden?")
        .await
    {
        Ok(turn) => turn,
        Err(e) => {
            session.close().await?;
            return Err(e.into());
        }
    };

    println!("Received {} audio messages", turn.len());
    let written = turn.save_wav(&path, PcmFormat::LIVE_OUTPUT).await?;
    println!("Audio response saved to {path} ({written} bytes of PCM)");

    session.close().await?;
    Ok(())
}
