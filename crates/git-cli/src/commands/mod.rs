pub mod blame;
pub mod cat_file;
pub mod for_each_ref;
pub mod hash_object;
pub mod index_pack;
pub mod merge_base;
pub mod pack_objects;
pub mod rev_list;
pub mod rev_parse;
pub mod symbolic_ref;
pub mod update_ref;
pub mod verify_pack;

use anyhow::Result;
use clap::Subcommand;

use crate::Cli;

#[derive(Subcommand)]
pub enum Commands {
    /// Provide content or type and size information for repository objects
    CatFile(cat_file::CatFileArgs),
    /// Compute object ID and optionally create a blob from a file
    HashObject(hash_object::HashObjectArgs),
    /// Pick out and massage parameters
    RevParse(rev_parse::RevParseArgs),
    /// Update the object name stored in a ref safely
    UpdateRef(update_ref::UpdateRefArgs),
    /// Output information on each ref
    ForEachRef(for_each_ref::ForEachRefArgs),
    /// Read, modify and delete symbolic refs
    SymbolicRef(symbolic_ref::SymbolicRefArgs),
    /// Lists commit objects in reverse chronological order
    RevList(rev_list::RevListArgs),
    /// Find as good common ancestors as possible for a merge
    MergeBase(merge_base::MergeBaseArgs),
    /// Show what revision and author last modified each line of a file
    Blame(blame::BlameArgs),
    /// Create a packed archive of objects
    PackObjects(pack_objects::PackObjectsArgs),
    /// Build pack index file for an existing packed archive
    IndexPack(index_pack::IndexPackArgs),
    /// Validate packed archive files
    VerifyPack(verify_pack::VerifyPackArgs),
}

impl Commands {
    /// Get the command name as used in config keys (e.g., "blame", "rev-list").
    pub fn command_name(&self) -> &str {
        match self {
            Commands::CatFile(_) => "cat-file",
            Commands::HashObject(_) => "hash-object",
            Commands::RevParse(_) => "rev-parse",
            Commands::UpdateRef(_) => "update-ref",
            Commands::ForEachRef(_) => "for-each-ref",
            Commands::SymbolicRef(_) => "symbolic-ref",
            Commands::RevList(_) => "rev-list",
            Commands::MergeBase(_) => "merge-base",
            Commands::Blame(_) => "blame",
            Commands::PackObjects(_) => "pack-objects",
            Commands::IndexPack(_) => "index-pack",
            Commands::VerifyPack(_) => "verify-pack",
        }
    }
}

/// Open a repository, respecting --git-dir override.
pub fn open_repo(cli: &Cli) -> Result<git_repository::Repository> {
    let repo = if let Some(ref git_dir) = cli.git_dir {
        git_repository::Repository::open(git_dir)?
    } else {
        git_repository::Repository::discover(".")?
    };
    Ok(repo)
}

pub fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::CatFile(args) => cat_file::run(args, &cli),
        Commands::HashObject(args) => hash_object::run(args, &cli),
        Commands::RevParse(args) => rev_parse::run(args, &cli),
        Commands::UpdateRef(args) => update_ref::run(args, &cli),
        Commands::ForEachRef(args) => for_each_ref::run(args, &cli),
        Commands::SymbolicRef(args) => symbolic_ref::run(args, &cli),
        Commands::RevList(args) => rev_list::run(args, &cli),
        Commands::MergeBase(args) => merge_base::run(args, &cli),
        Commands::Blame(args) => blame::run(args, &cli),
        Commands::PackObjects(args) => pack_objects::run(args, &cli),
        Commands::IndexPack(args) => index_pack::run(args, &cli),
        Commands::VerifyPack(args) => verify_pack::run(args, &cli),
    }
}
