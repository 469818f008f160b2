use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use stylist_core::container::Kms;
use stylist_core::Project;

#[derive(Subcommand)]
pub enum KmsSubcommand {
    /// List key aliases
    ListKeys,

    /// Encrypt text and print the base64 ciphertext
    Encrypt {
        text: String,
        /// Key alias without the alias/ prefix (default: the kms feature's key)
        #[arg(long)]
        key_alias: Option<String>,
        /// Print only the ciphertext
        #[arg(long)]
        plain: bool,
    },

    /// Decrypt base64 ciphertext
    Decrypt { ciphertext: String },
}

pub fn run(project: &Project, subcmd: KmsSubcommand, json: bool) -> anyhow::Result<()> {
    let kms = project.container().get::<Kms>()?;
    match subcmd {
        KmsSubcommand::ListKeys => {
            let keys = kms.list_keys().context("failed to list keys")?;
            if json {
                return print_json(&keys);
            }
            let rows = keys
                .into_iter()
                .map(|k| vec![k.alias_name, k.target_key_id.unwrap_or_default()])
                .collect();
            print_table(&["ALIAS", "KEY ID"], rows);
            Ok(())
        }
        KmsSubcommand::Encrypt {
            text,
            key_alias,
            plain,
        } => {
            let alias = key_alias.as_deref().unwrap_or(kms.default_alias()).to_string();
            let ciphertext = kms
                .encrypt(&text, Some(&alias))
                .context("failed to encrypt")?;
            if json {
                print_json(&serde_json::json!({ "key_alias": alias, "ciphertext": ciphertext }))
            } else if plain {
                println!("{ciphertext}");
                Ok(())
            } else {
                println!("Encrypted with alias/{alias}:");
                println!("{ciphertext}");
                Ok(())
            }
        }
        KmsSubcommand::Decrypt { ciphertext } => {
            let text = kms.decrypt(&ciphertext).context("failed to decrypt")?;
            if json {
                print_json(&serde_json::json!({ "plaintext": text }))
            } else {
                println!("{text}");
                Ok(())
            }
        }
    }
}
