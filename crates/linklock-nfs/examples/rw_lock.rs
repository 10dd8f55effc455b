//! Example: coordinating readers and a writer through a shared directory
//!
//! Run with: `cargo run --example rw_lock`

use linklock_core::prelude::*;
use linklock_nfs::NfsLockProvider;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // In production this directory lives on the shared NFS mount.
    let provider = NfsLockProvider::builder()
        .directory("/tmp/linklock-demo")
        .spin_interval(Duration::from_micros(1000))
        .entry_timeout(Duration::from_secs(10))
        .build()?;

    println!("Created lock provider");

    let lock = provider.create_reader_writer_lock("example-resource")?;
    println!("Created lock: {}", lock.name());

    // Any number of processes may hold a read lock concurrently.
    let read_handle = lock.acquire_read(None).await?;
    println!("Read lock acquired");

    // ... read the protected data ...
    tokio::time::sleep(Duration::from_millis(100)).await;

    read_handle.release().await?;
    println!("Read lock released");

    // A writer holds the lock alone; peers' readers wait for it to drain.
    match lock.try_acquire_write().await? {
        Some(write_handle) => {
            println!("Write lock acquired");

            // ... update the protected data ...
            tokio::time::sleep(Duration::from_millis(100)).await;

            write_handle.release().await?;
            println!("Write lock released");
        }
        None => {
            println!("Write lock is currently contended");
        }
    }

    // Acquire with a deadline instead of waiting indefinitely.
    let handle = lock.acquire_write(Some(Duration::from_secs(5))).await?;
    println!("Write lock acquired within the deadline");
    handle.release().await?;

    Ok(())
}
