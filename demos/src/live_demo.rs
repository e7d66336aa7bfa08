use chrono::Local;
use log::info;
use piggy_ledger::prelude::*;
use piggy_ledger::FileSessionStore;
use std::env;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    // Backend URL and anon key from the environment or a .env file
    let url = env::var("PIGGY_URL").map_err(|_| Error::general("PIGGY_URL must be set"))?;
    let key = env::var("PIGGY_KEY").map_err(|_| Error::general("PIGGY_KEY must be set"))?;
    let session_path = env::var("PIGGY_SESSION").unwrap_or_else(|_| "piggy-session.json".into());

    let piggy = PiggyLedger::new(&url, &key, Arc::new(FileSessionStore::new(session_path)));
    let mut remote = piggy.remote()?;
    // Row-level security needs a user token; without one the anon key is used.
    if let Ok(token) = env::var("PIGGY_ACCESS_TOKEN") {
        remote.set_auth(&token).await?;
        info!("Using access token for {}", remote.collection());
    }
    let ledger = piggy.ledger_with(Arc::new(remote));
    let mut sync = piggy.subscriber(&ledger);
    let mut state = sync.watch_state();
    sync.start().await?;

    // This demo assumes an `expenses` table with realtime enabled:
    // create table expenses (
    //   id bigserial primary key,
    //   title text, amount numeric, "paymentMethod" text, category text,
    //   "userId" text, "createdAt" timestamptz, timestamp timestamptz
    // );

    let expense = ledger
        .create(
            ExpenseDraft::new("Demo lunch", 12.0)
                .with_payment_method(PaymentMethod::CreditCard)
                .with_category(Category::Food),
        )
        .await?;
    info!("Created {} ({})", expense.title, expense.id);

    println!("Watching for 30 seconds. Change the table elsewhere to see updates.");
    let deadline = sleep(Duration::from_secs(30));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("Sync state: {}", *state.borrow_and_update());
            }
            _ = sleep(Duration::from_secs(5)) => {
                let report = aggregate(&ledger.snapshot().await, Window::Monthly, &Local::now());
                println!("This month: {:.2} over {} records", report.total, report.count);
            }
        }
    }

    ledger.delete(&expense.id).await?;
    sync.stop().await;
    Ok(())
}
