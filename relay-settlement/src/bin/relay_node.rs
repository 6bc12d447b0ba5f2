//! Relay node binary
//!
//! Hosts a pool registry and settles relay instructions. Commands arrive as
//! JSON lines on stdin; each produces one JSON line on stdout. Logs go to
//! stderr.

use pool_core::{
    Address, CapabilityStore, Coin, KeyPair, Lane, Nonce, Payout, PoolId, ProofStore, SnapshotStore,
    ValueType, WithdrawProof,
};
use prometheus::{Encoder, TextEncoder};
use relay_settlement::{
    deliver_or_return, Config, ExternalBalances, PoolRegistry, RelayInstruction, RelaySettler, SignedInstruction,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Value type held by this node's pools
struct Units;

impl ValueType for Units {
    const SYMBOL: &'static str = "UNIT";
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    CreatePool {
        owner: Address,
        pool: PoolId,
    },
    Supply {
        pool: PoolId,
        depositor: Address,
        amount: u64,
    },
    Repay {
        pool: PoolId,
        payer: Address,
        amount: u64,
    },
    SetRelayer {
        pool: PoolId,
        caller: Address,
        relayer: Option<Address>,
    },
    WithdrawLocal {
        pool: PoolId,
        holder: Address,
        amount: u64,
    },
    WithdrawRoot {
        pool: PoolId,
        holder: Address,
        destination: Address,
        amount: u64,
    },
    TransferCapability {
        pool: PoolId,
        from: Address,
        to: Address,
    },
    RemoteWithdraw {
        pool: PoolId,
        requester: Address,
        destination_domain: u16,
        receiver: Address,
        amount: u64,
    },
    RemoteBorrow {
        pool: PoolId,
        requester: Address,
        destination_domain: u16,
        receiver: Address,
        amount: u64,
    },
    Relay {
        pool: PoolId,
        lane: Lane,
        destination: Address,
        amount: u64,
        nonce: Nonce,
    },
    Signed {
        instruction: SignedInstruction,
    },
    Batch {
        instructions: Vec<RelayInstruction>,
    },
    Balance {
        pool: PoolId,
    },
    Account {
        address: Address,
        pool: Option<PoolId>,
    },
    Snapshot,
    Metrics,
}

struct Node {
    keypair: KeyPair,
    registry: Arc<PoolRegistry<Units>>,
    settler: RelaySettler<Units>,
    wallets: Arc<ExternalBalances<Units>>,
    capabilities: CapabilityStore<Units>,
    proofs: ProofStore<Units>,
    snapshots: SnapshotStore,
}

impl Node {
    async fn execute(&self, command: Command) -> relay_settlement::Result<Value> {
        match command {
            Command::CreatePool { owner, pool } => {
                let (handle, capability) = self.registry.create_pool(owner, pool)?;
                self.capabilities.give(owner, capability)?;
                Ok(json!({ "pool": handle.pool_id(), "owner": owner }))
            }

            Command::Supply { pool, depositor, amount } => {
                let handle = self.registry.pool(pool)?;
                let mut funds = Coin::from_external(amount);
                let proof = handle.supply(depositor, &mut funds, amount).await?;
                funds.destroy_zero()?;
                self.keep_proof(depositor, proof)?;
                Ok(json!({ "claim": self.proofs.amount_of(depositor, pool) }))
            }

            Command::Repay { pool, payer, amount } => {
                let handle = self.registry.pool(pool)?;
                let mut funds = Coin::from_external(amount);
                handle.repay(payer, &mut funds, amount).await?;
                funds.destroy_zero()?;
                Ok(json!({ "balance": handle.balance().await? }))
            }

            Command::SetRelayer { pool, caller, relayer } => {
                let relayer = relayer.unwrap_or_else(|| self.keypair.address());
                self.registry.pool(pool)?.set_relayer(caller, relayer).await?;
                Ok(json!({ "relayer": relayer }))
            }

            Command::WithdrawLocal { pool, holder, amount } => {
                let handle = self.registry.pool(pool)?;
                let mut proof = self.proofs.take(holder, pool)?;
                let result = handle.withdraw_local(holder, &mut proof, amount).await;
                self.keep_proof(holder, proof)?;

                let payout = Payout {
                    destination: holder,
                    coin: result?,
                };
                deliver_or_return(self.wallets.as_ref(), &handle, payout).await?;
                Ok(json!({ "claim": self.proofs.amount_of(holder, pool) }))
            }

            Command::WithdrawRoot {
                pool,
                holder,
                destination,
                amount,
            } => {
                let handle = self.registry.pool(pool)?;
                let capability = self.capabilities.take(holder, pool)?;
                let result = handle.withdraw_root(&capability, destination, amount).await;
                self.capabilities.give(holder, capability)?;

                deliver_or_return(self.wallets.as_ref(), &handle, result?).await?;
                Ok(json!({ "balance": handle.balance().await? }))
            }

            Command::TransferCapability { pool, from, to } => {
                self.capabilities.transfer(from, to, pool)?;
                Ok(json!({ "holder": to }))
            }

            Command::RemoteWithdraw {
                pool,
                requester,
                destination_domain,
                receiver,
                amount,
            } => {
                let handle = self.registry.pool(pool)?;
                let mut proof = self.proofs.take(requester, pool)?;
                let result = handle
                    .request_remote_withdraw(requester, &mut proof, destination_domain, receiver, amount)
                    .await;
                self.keep_proof(requester, proof)?;
                Ok(serde_json::to_value(result?)?)
            }

            Command::RemoteBorrow {
                pool,
                requester,
                destination_domain,
                receiver,
                amount,
            } => {
                let request = self
                    .registry
                    .pool(pool)?
                    .request_remote_borrow(requester, destination_domain, receiver, amount)
                    .await?;
                Ok(serde_json::to_value(request)?)
            }

            Command::Relay {
                pool,
                lane,
                destination,
                amount,
                nonce,
            } => {
                let signed = RelayInstruction {
                    lane,
                    pool,
                    destination,
                    amount,
                    nonce,
                }
                .sign(&self.keypair)?;
                Ok(serde_json::to_value(self.settler.settle(&signed).await?)?)
            }

            Command::Signed { instruction } => Ok(serde_json::to_value(self.settler.settle(&instruction).await?)?),

            Command::Batch { instructions } => {
                let signed = instructions
                    .into_iter()
                    .map(|instruction| instruction.sign(&self.keypair))
                    .collect::<relay_settlement::Result<Vec<_>>>()?;
                Ok(serde_json::to_value(self.settler.settle_batch(signed).await?)?)
            }

            Command::Balance { pool } => {
                let handle = self.registry.pool(pool)?;
                Ok(json!({
                    "balance": handle.balance().await?,
                    "relayer": handle.relayer().await?,
                    "claims": self.proofs.total_for(pool),
                    "root_holder": self.capabilities.holder_of(pool),
                }))
            }

            Command::Account { address, pool } => Ok(json!({
                "external": self.wallets.balance_of(address),
                "claim": pool.map(|pool| self.proofs.amount_of(address, pool)),
            })),

            Command::Snapshot => {
                let saved = self
                    .registry
                    .save_all(&self.snapshots, &self.capabilities, &self.proofs)
                    .await?;
                Ok(json!({ "saved": saved }))
            }

            Command::Metrics => {
                let mut buffer = Vec::new();
                TextEncoder::new()
                    .encode(&self.registry.metrics().registry().gather(), &mut buffer)
                    .map_err(|e| relay_settlement::Error::Serialization(e.to_string()))?;
                Ok(Value::String(String::from_utf8_lossy(&buffer).into_owned()))
            }
        }
    }

    /// Return `proof` to its holder, destroying it once exhausted
    fn keep_proof(&self, holder: Address, proof: WithdrawProof<Units>) -> relay_settlement::Result<()> {
        if proof.amount() == 0 {
            proof.destroy_zero()?;
            return Ok(());
        }
        if let Err(refused) = self.proofs.deposit(holder, proof) {
            let (error, proof) = refused.into_parts();
            let abandoned = proof.destroy();
            tracing::error!(holder = %holder, amount = abandoned.amount, error = %error, "Could not store proof");
            return Err(error.into());
        }
        Ok(())
    }

    /// Persist pools with their token holdings, then release the tokens
    async fn close(self) -> anyhow::Result<()> {
        let saved = self
            .registry
            .save_all(&self.snapshots, &self.capabilities, &self.proofs)
            .await?;
        self.registry.shutdown().await?;

        let capabilities = self.capabilities.into_locations().len();
        let claims = self.proofs.into_claims();
        let claimed: u128 = claims.iter().map(|(_, claim)| u128::from(claim.amount)).sum();

        tracing::info!(
            saved,
            capabilities,
            claims = claims.len(),
            claimed = %claimed,
            external_total = %self.wallets.total(),
            "Relay node stopped"
        );
        Ok(())
    }
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.pool.log.filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.pool.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn respond(stdout: &mut tokio::io::Stdout, line: Value) -> anyhow::Result<()> {
    let mut bytes = serde_json::to_vec(&line)?;
    bytes.push(b'\n');
    stdout.write_all(&bytes).await?;
    stdout.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize logging
    init_tracing(&config);

    tracing::info!(service = %config.service_name, "Starting relay node");

    let keypair = match &config.relayer_seed {
        Some(seed) => KeyPair::from_seed_hex(seed)?,
        None => {
            tracing::warn!("No relayer seed configured, generating an ephemeral key");
            KeyPair::generate()
        }
    };
    tracing::info!(relayer = %keypair.address(), "Relayer key loaded");

    // Restore pools
    let snapshots = SnapshotStore::open(&config.pool.data_dir)?;
    let registry = Arc::new(PoolRegistry::<Units>::new(&config.pool));
    let capabilities = CapabilityStore::new();
    let proofs = ProofStore::new();
    let restored = registry.restore_all(&snapshots, &capabilities, &proofs)?;
    tracing::info!(restored, data_dir = %config.pool.data_dir.display(), "Pools restored");

    let mut events = registry.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!(pool = %event.pool, event = ?event.kind, "Pool event");
        }
    });

    let wallets = Arc::new(ExternalBalances::new());
    let settler = RelaySettler::from_config(Arc::clone(&registry), wallets.clone(), &config);

    let node = Node {
        keypair,
        registry,
        settler,
        wallets,
        capabilities,
        proofs,
        snapshots,
    };

    tracing::info!("Relay node ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Command>(&line) {
            Ok(command) => match node.execute(command).await {
                Ok(result) => json!({ "ok": true, "result": result }),
                Err(e) => json!({
                    "ok": false,
                    "code": e.code(),
                    "reason": e.reason(),
                    "error": e.to_string(),
                }),
            },
            Err(e) => json!({ "ok": false, "reason": "invalid_command", "error": e.to_string() }),
        };
        respond(&mut stdout, reply).await?;
    }

    node.close().await
}
