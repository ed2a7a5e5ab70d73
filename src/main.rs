use portal::app;
use portal::store::{Database, DATABASE_DIR};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    // One-off bootstrap: create the first super_admin account.
    if args.len() >= 4 && args[1] == "setup-admin" {
        portal::auth::init_users()?;
        let db = Database::open(DATABASE_DIR)?;
        let user_id = app::bootstrap_super_admin(&db, &args[2], &args[3])?;
        println!("Super admin created: {} ({})", args[2], user_id);
        return Ok(());
    }

    // Default port, overridable as the first argument
    let mut port = 3000;
    if args.len() >= 2 {
        port = args[1].parse().unwrap_or(3000);
    }

    // Start the web application
    app::run(port).await?;

    Ok(())
}
