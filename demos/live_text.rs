use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let client = gemini_live::Client::from_env()?;
    let mut session = client.live("gemini-2.0-flash-exp").await?;

    println!("{}", "-".repeat(80));
    println!("Sending: Tell me a short story about vibe coding");

    let turn = match session.ask("Tell me a short story about vibe coding").await {
        Ok(turn) => turn,
        Err(e) => {
            // transport failures already closed the session
            session.close().await?;
            return Err(e.into());
        }
    };

    println!("{}", turn.text());
    session.close().await?;
    println!("Session closed successfully");
    Ok(())
}
