mod cli;

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use clap::Parser;
use cli::{Cli, Command};
use flat_fs::{FileHandle, FileSystem, OpenFlag};
use flat_fs_fuse::HostStore;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let store = HostStore::new(&cli.dir, cli.blocks);
    log::info!("image={:?}", store.path(&cli.store));

    let name = cli.store.as_str();
    match cli.command {
        Command::Mkfs => FileSystem::make_store(&store, name).map_err(io::Error::other),
        Command::Pack { source } => {
            FileSystem::make_store(&store, name).map_err(io::Error::other)?;
            session(&store, name, |fs| pack(fs, &source))
        }
        Command::Put { host, name: target } => session(&store, name, |fs| {
            let target = match target {
                Some(target) => target,
                None => host
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_owned)
                    .ok_or_else(|| io::Error::other("host path has no UTF-8 file name"))?,
            };
            put(fs, &host, &target)
        }),
        Command::Cat { name: file } => session(&store, name, |fs| {
            let data = with_handle(fs, &file, |fs, handle| fs.read(handle, usize::MAX))?;
            io::stdout().write_all(&data)
        }),
        Command::Ls => session(&store, name, |fs| {
            for file in fs.list_names() {
                let size = with_handle(fs, &file, |fs, handle| fs.filesize(handle))?;
                println!("{size:>10} {file}");
            }
            Ok(())
        }),
        Command::Rm { name: file } => {
            session(&store, name, |fs| fs.delete(&file).map_err(io::Error::other))
        }
        Command::Truncate { name: file, len } => session(&store, name, |fs| {
            with_handle(fs, &file, |fs, handle| fs.truncate(handle, len))
        }),
        Command::Df => session(&store, name, |fs| {
            let stat = fs.statfs();
            println!(
                "blocks: {} total, {} free\ninodes: {} free\nfiles:  {}",
                stat.total_blocks, stat.free_blocks, stat.free_inodes, stat.files
            );
            Ok(())
        }),
    }
}

/// 挂载镜像执行`f`，无论成败都卸载
fn session(
    store: &HostStore,
    name: &str,
    f: impl FnOnce(&mut FileSystem) -> io::Result<()>,
) -> io::Result<()> {
    let mut fs = FileSystem::mount(store, name).map_err(io::Error::other)?;
    let result = f(&mut fs);
    fs.unmount().map_err(io::Error::other)?;
    result
}

/// 打开文件执行`f`后关闭
fn with_handle<T>(
    fs: &mut FileSystem,
    name: &str,
    f: impl FnOnce(&mut FileSystem, FileHandle) -> flat_fs::Result<T>,
) -> io::Result<T> {
    let handle = fs.open(name).map_err(io::Error::other)?;
    let result = f(fs, handle);
    fs.close(handle).map_err(io::Error::other)?;
    result.map_err(io::Error::other)
}

fn pack(fs: &mut FileSystem, source: &Path) -> io::Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("skipped non-UTF-8 name {:?}", entry.file_name());
            continue;
        };

        println!("file: {name:?}");
        put(fs, &entry.path(), &name)?;
    }

    Ok(())
}

fn put(fs: &mut FileSystem, host: &Path, name: &str) -> io::Result<()> {
    let data = fs::read(host)?;
    let handle = fs
        .open_with(name, OpenFlag::CREATE | OpenFlag::TRUNC)
        .map_err(io::Error::other)?;
    let written = fs.write(handle, &data);
    fs.close(handle).map_err(io::Error::other)?;

    let written = written.map_err(io::Error::other)?;
    if written < data.len() {
        log::warn!("{name:?}: only {written} of {} bytes fit", data.len());
    }
    Ok(())
}
