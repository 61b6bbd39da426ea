use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::{Context, Result};
use rand::{Rng, seq::SliceRandom};
use tokio::{sync::oneshot, time::sleep};
use tracing::warn;

use crate::{
    cli::DemoArgs,
    client::{RelayClient, print_frames, write_stdout},
    codec::{Command, write_frame},
    config::RelayConfig,
    relay::Relay,
};

/// Time given to every simulated user to register before anyone lists.
const JOIN_GRACE: Duration = Duration::from_secs(3);

/// Runs a relay on an ephemeral port with simulated users that keep greeting
/// random peers until the demo duration elapses.
pub async fn run(args: DemoArgs) -> Result<()> {
    let relay = Relay::bind(
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        RelayConfig::default(),
    )
    .await?;
    let addr = relay.local_addr()?;
    write_stdout(&format!("*** relay listening on {addr}")).await?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(relay.run_until(async move {
        let _ = stop_rx.await;
    }));

    let users: Vec<_> = args
        .users
        .into_iter()
        .map(|name| {
            tokio::spawn(async move {
                if let Err(error) = simulate_user(addr, &name).await {
                    warn!(user = %name, ?error, "simulated user stopped");
                }
            })
        })
        .collect();

    sleep(Duration::from_secs(args.duration_secs)).await;

    for user in &users {
        user.abort();
    }
    let _ = stop_tx.send(());
    server.await.context("relay task failed")??;
    Ok(())
}

async fn simulate_user(addr: SocketAddr, name: &str) -> Result<()> {
    let mut client = RelayClient::connect(addr).await?;
    client.register(name).await?;

    sleep(JOIN_GRACE).await;

    let friends = client.list().await?;
    write_stdout(&format!("{name} received: {friends:?}")).await?;

    let (reader, mut writer) = client.into_split();
    tokio::spawn(print_frames(reader, format!("{name} received: ")));

    loop {
        let (friend, pause) = {
            let mut rng = rand::thread_rng();
            (friends.choose(&mut rng).cloned(), rng.gen_range(2..=6))
        };
        let Some(friend) = friend else {
            return Ok(());
        };

        write_frame(&mut writer, &Command::Chat { target: friend }.encode()).await?;
        sleep(Duration::from_secs(pause)).await;
    }
}
