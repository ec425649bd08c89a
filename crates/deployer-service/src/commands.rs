//! Subcommands of the spot deployer.

use clap::{ArgGroup, Subcommand};
use deployer_core::{Deployer, OperatorVerdict, SendToEvmParams};
use deployer_core::actions::DEFAULT_GAS_LIMIT;
use deployer_types::{Chain, DispatchOutcome, FinalizeEvmContractInput};
use tokio::sync::watch;

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Run every remaining step of a configured deployment
	Deploy { symbol: String },

	/// Show the stored record and log of a deployment
	Status { symbol: String },

	/// Settle a pending step that reconciliation could not decide
	#[command(group(ArgGroup::new("verdict").required(true).args(["landed", "not_landed"])))]
	Confirm {
		symbol: String,
		/// The pending step was applied by the exchange
		#[arg(long)]
		landed: bool,
		/// The pending step never took effect
		#[arg(long)]
		not_landed: bool,
		/// Token or spot index assigned by the exchange, for steps that yield one
		#[arg(long, requires = "landed")]
		index: Option<u32>,
	},

	/// Transfer a spot token on the native ledger
	SpotSend {
		#[arg(long)]
		destination: String,
		/// Token id as `NAME:0x<token id>`
		#[arg(long)]
		token: String,
		#[arg(long)]
		amount: String,
	},

	/// Transfer a token to a contract on an EVM chain, with calldata
	SendToEvm {
		#[arg(long)]
		token: String,
		#[arg(long)]
		amount: String,
		/// Destination chain name, e.g. `hyperevm-testnet`
		#[arg(long)]
		chain: Chain,
		/// Overrides the body destination id, e.g. a bridge domain
		#[arg(long)]
		destination_chain_id: Option<u32>,
		#[arg(long)]
		recipient: String,
		#[arg(long, default_value = "")]
		source_dex: String,
		#[arg(long, default_value_t = DEFAULT_GAS_LIMIT)]
		gas_limit: u64,
		#[arg(long, default_value = "0x")]
		data: String,
	},

	/// Request a link between a deployed token and an EVM contract
	RequestEvmContract {
		symbol: String,
		#[arg(long)]
		address: String,
		#[arg(long)]
		evm_extra_wei_decimals: u8,
	},

	/// Finalize the requested EVM contract link
	FinalizeEvmContract {
		symbol: String,
		/// Nonce of the contract creation; omit when the deployer address is
		/// stored in the first storage slot
		#[arg(long)]
		create_nonce: Option<u64>,
	},

	/// Print the signer address after a local signature self-check
	Address,
}

pub async fn run(
	deployer: &Deployer,
	command: Command,
	cancel: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
	match command {
		Command::Deploy { symbol } => {
			let mut pipeline = deployer.open_pipeline(&symbol, cancel).await?;
			let state = pipeline.run().await?;
			println!("{}: {}", pipeline.key(), state);
		},
		Command::Status { symbol } => match deployer.status(&symbol).await? {
			Some((record, history)) => {
				println!("{}", serde_json::to_string_pretty(&record)?);
				for entry in history {
					println!("{}", serde_json::to_string(&entry)?);
				}
			},
			None => println!("{}: no record", deployer.key(&symbol)),
		},
		Command::Confirm {
			symbol,
			landed,
			not_landed: _,
			index,
		} => {
			let mut pipeline = deployer.open_pipeline(&symbol, cancel).await?;
			let state = pipeline
				.confirm(OperatorVerdict {
					landed,
					identifier: index,
				})
				.await?;
			println!("{}: {}", pipeline.key(), state);
		},
		Command::SpotSend {
			destination,
			token,
			amount,
		} => {
			let action = deployer.actions().spot_send(&destination, &token, &amount)?;
			let (nonce, outcome) = deployer.submitter().submit(action).await?;
			print_outcome(nonce.0, &outcome);
		},
		Command::SendToEvm {
			token,
			amount,
			chain,
			destination_chain_id,
			recipient,
			source_dex,
			gas_limit,
			data,
		} => {
			let action = deployer.actions().send_to_evm_with_data(SendToEvmParams {
				token,
				amount,
				destination_chain: chain,
				destination_chain_id,
				destination_recipient: recipient,
				source_dex,
				gas_limit,
				data,
			})?;
			let (nonce, outcome) = deployer.submitter().submit(action).await?;
			print_outcome(nonce.0, &outcome);
		},
		Command::RequestEvmContract {
			symbol,
			address,
			evm_extra_wei_decimals,
		} => {
			let mut pipeline = deployer.open_pipeline(&symbol, cancel).await?;
			pipeline.resolve_pending().await?;
			let outcome = pipeline
				.request_evm_contract(&address, evm_extra_wei_decimals)
				.await?;
			println!("{}: {:?}", pipeline.key(), outcome);
		},
		Command::FinalizeEvmContract {
			symbol,
			create_nonce,
		} => {
			let input = match create_nonce {
				Some(nonce) => FinalizeEvmContractInput::Create { nonce },
				None => FinalizeEvmContractInput::FirstStorageSlot,
			};
			let mut pipeline = deployer.open_pipeline(&symbol, cancel).await?;
			pipeline.resolve_pending().await?;
			let outcome = pipeline.finalize_evm_contract(input).await?;
			println!("{}: {:?}", pipeline.key(), outcome);
		},
		Command::Address => {
			println!("{}", deployer.self_check().await?);
		},
	}
	Ok(())
}

fn print_outcome(nonce: u64, outcome: &DispatchOutcome) {
	match outcome {
		DispatchOutcome::Accepted { data: Some(data) } => {
			println!("accepted (nonce {}): {}", nonce, data)
		},
		DispatchOutcome::Accepted { data: None } => println!("accepted (nonce {})", nonce),
		DispatchOutcome::Rejected { reason } => println!("rejected (nonce {}): {}", nonce, reason),
	}
}
