use std::path::PathBuf;

use alloy_primitives::{Address, Bytes, U256};
use clap::Parser;
use hyla_config::NodeConfig;
use hyla_domain::{AccountTx, Commit, Genesis, GenesisAccount, PubKey, Transaction, TxKind};
use hyla_ledger::{LedgerService, LedgerView};
use hyla_primitives::{COIN, MAX_GAS_LIMIT, MIN_GAS_LIMIT};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;

const BLOCK_GAS_LIMIT: u64 = 100 * MAX_GAS_LIMIT;
const DEVNET_FUNDS: u64 = 1_000_000;

#[derive(Parser, Debug)]
#[command(name = "hyla")]
#[command(about = "Execution core of a hybrid UTXO and account chain")]
pub(crate) struct Cli {
    /// Node configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Genesis document. A devnet genesis is generated when absent.
    #[arg(short, long, value_name = "FILE")]
    pub genesis: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Number of blocks to produce.
    #[arg(long, default_value_t = 10)]
    pub blocks: u64,

    /// Transfers submitted per block when a funded key is available.
    #[arg(long, default_value_t = 4)]
    pub txs: u64,
}

/// Funded key of a generated devnet genesis.
#[derive(Debug)]
struct Faucet {
    key: SigningKey,
    nonce: u64,
}

impl Cli {
    pub(crate) fn run(self) -> eyre::Result<()> {
        let config = NodeConfig::load(self.config.as_deref())?;
        tracing::debug!(?config, "Full configuration");

        let (genesis, faucet) = match &self.genesis {
            Some(path) => (Genesis::load(path)?, None),
            None => {
                let key = SigningKey::random(&mut OsRng);
                let address = PubKey::from_signing_key(&key).address()?;
                tracing::info!(%address, "Generated devnet faucet");
                let genesis = Genesis::default()
                    .with_account(GenesisAccount::funded(address, U256::from(DEVNET_FUNDS) * COIN));
                (genesis, Some(Faucet { key, nonce: 0 }))
            }
        };
        tracing::info!(accounts = genesis.accounts.len(), "Loaded genesis");

        let view = LedgerView::open(&config, &genesis)?;
        let service = LedgerService::new(view);

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.drive(&service, faucet))
    }

    async fn drive(&self, service: &LedgerService, mut faucet: Option<Faucet>) -> eyre::Result<()> {
        let view = service.view();
        let start = view.height().await + 1;
        tracing::info!(height = start - 1, "Starting devnet");

        for height in start..start + self.blocks {
            if let Some(faucet) = faucet.as_mut() {
                for _ in 0..self.txs {
                    let tx = faucet.transfer()?;
                    if let Err(err) = service.submit_tx(tx) {
                        tracing::warn!(height, %err, "transaction rejected");
                        continue;
                    }
                    faucet.nonce += 1;
                }
            }

            let time = view.head().await.header.time + 1;
            let mut block = service.create_block(height, self.txs as usize, BLOCK_GAS_LIMIT, time).await?;
            service.pre_run_block(&mut block).await?;
            if !service.check_block(&block).await? {
                eyre::bail!("proposed block {height} failed validation");
            }

            let hash = block.id();
            let txs = block.txs.len();
            let gas_used = block.header.gas_used;
            let state_hash = block.header.state_hash;
            let commit = Commit { height, round: 0, block_hash: hash.0, signatures: Vec::new() };
            let validators = service.commit_block(block, commit, false).await?;
            tracing::info!(
                height,
                hash = %hash.0,
                txs,
                gas_used,
                state_hash = %state_hash,
                validators = validators.len(),
                "Committed block"
            );
        }

        if let Some(faucet) = &faucet {
            let address = PubKey::from_signing_key(&faucet.key).address()?;
            let balance = view.get_balance(&address, &Address::ZERO)?;
            tracing::info!(%address, %balance, nonce = view.get_nonce(&address)?, "Faucet after run");
        }
        service.stop();
        Ok(())
    }
}

impl Faucet {
    fn transfer(&self) -> eyre::Result<Transaction> {
        let to = PubKey::from_signing_key(&SigningKey::random(&mut OsRng)).address()?;
        let mut tx = AccountTx::new(self.nonce, Some(to), COIN, MIN_GAS_LIMIT, Bytes::new());
        tx.sign(TxKind::Transfer, &self.key)?;
        Ok(Transaction::Transfer(tx))
    }
}
