use recap_core::backup::Backuper;

use crate::cli::args::BackupArgs;
use crate::cli::commands::exit_codes;

pub fn run(args: BackupArgs) -> anyhow::Result<i32> {
    let backuper = Backuper::new(&args.dest)?;
    let written = match (&args.file, &args.dir) {
        (Some(file), _) => backuper.backup_file(file)?,
        (None, Some(dir)) => {
            let prefix = args.prefix.as_deref().unwrap_or("backup");
            backuper.backup_dir_as_archive(dir, prefix)?
        }
        (None, None) => anyhow::bail!("either --file or --dir is required"),
    };
    eprintln!("Backed up to {}", written.display());
    Ok(exit_codes::SUCCESS)
}
