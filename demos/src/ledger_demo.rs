use chrono::Local;
use piggy_ledger::prelude::*;
use piggy_ledger::MemorySessionStore;
use std::sync::Arc;
use std::time::Duration;

fn print_report(report: &Report) {
    println!("{} total: {:.2} ({} records)", report.window, report.total, report.count);
    for method in PaymentMethod::ALL {
        println!("  {:<12} {:>8.2}", method, report.by_payment_method.get(method));
    }
    for entry in &report.by_category {
        println!("  {:<12} {:>8.2}", entry.category, entry.amount);
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    // Everything stays in memory: no backend needed.
    let session = Arc::new(MemorySessionStore::new());
    let piggy = PiggyLedger::new("http://localhost:54321", "demo-key", session);
    let remote = Arc::new(MemoryRemoteStore::new());
    let ledger = piggy.ledger_with(remote.clone());

    let user = piggy
        .accounts()
        .sign_up("Hana", "hana@example.com", "secret123", "secret123")
        .await?;
    println!("Signed up as {} ({})", user.name, user.id);

    let mut sync = piggy.subscriber(&ledger);
    sync.start().await?;
    println!("Sync state: {}", sync.state());

    let coffee = ledger
        .create(ExpenseDraft::new("Coffee", 4.5).with_category(Category::Food))
        .await?;
    ledger
        .create(
            ExpenseDraft::new("Train pass", 60.0)
                .with_payment_method(PaymentMethod::DebitCard)
                .with_category(Category::Transport),
        )
        .await?;
    ledger
        .create(
            ExpenseDraft::new("Headphones", 120.0)
                .with_payment_method(PaymentMethod::CreditCard)
                .with_category(Category::Shopping),
        )
        .await?;
    ledger
        .update(&coffee.id, ExpensePatch::new().with_amount(5.25))
        .await?;

    // Let the feed catch up.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let now = Local::now();
    for window in Window::ALL {
        print_report(&aggregate(&ledger.snapshot().await, window, &now));
    }

    println!("Going offline");
    remote.set_online(false);
    remote.fail_subscriptions("network lost");
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("Sync state: {}", sync.state());

    let snack = ledger
        .create(ExpenseDraft::new("Snack", 2.0).with_category(Category::Food))
        .await?;
    println!("Saved {} locally as {}", snack.title, snack.id);

    let breakdown = partition_by_payment_method(&ledger.snapshot().await);
    println!("Cash spending: {:.2}", breakdown.total(PaymentMethod::Cash));

    sync.stop().await;
    Ok(())
}
