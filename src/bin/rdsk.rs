/// Interactive console for disk images, filesystems and MMB containers

use retrodisk::*;
use retrodisk::io::vdk;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use std::path::{Path, PathBuf};

const COMMANDS: &[&str] = &[
    "convert",
    "delete",
    "exit",
    "extract",
    "format",
    "geometry",
    "help",
    "info",
    "insert",
    "ls",
    "mmb-boot",
    "mmb-extract",
    "mmb-insert",
    "mmb-lock",
    "mmb-ls",
    "mmb-mount",
    "mmb-new",
    "mmb-open",
    "mmb-remove",
    "mmb-resize",
    "mmb-unlock",
    "mount",
    "new",
    "open",
    "quit",
    "read",
    "save",
    "sectors",
    "tracks",
    "tree",
    "umount",
];

const PRESETS: &[&str] = &[
    "dragon-ss40",
    "dragon-ss80",
    "dragon-ds40",
    "dragon-ds80",
    "coco-35",
    "pc-360k",
    "pc-720k",
    "pc-1440k",
    "acorn-ssd40",
    "acorn-ssd80",
    "dos68-35",
    "dos68-40",
    "dos68-77",
];

/// Command completer for the REPL
struct CommandCompleter;

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        // Only the command name is completed
        let line_to_cursor = &line[..pos];
        if line_to_cursor.contains(' ') {
            return Ok((pos, vec![]));
        }

        let prefix = line_to_cursor.to_lowercase();
        let matches = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(&prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|mut p| {
        p.push(".rdsk_history");
        p
    })
}

/// Whatever the user has open
#[derive(Default)]
struct Session {
    image: Option<DiskImage>,
    fs: Option<Box<dyn FileSystem>>,
    mmb: Option<MmbFile>,
}

impl Session {
    fn image(&self) -> Result<&DiskImage> {
        match (&self.fs, &self.image) {
            (Some(fs), _) => Ok(fs.image()),
            (None, Some(image)) => Ok(image),
            _ => Err(DiskError::filesystem("no image open; use 'open' or 'new'")),
        }
    }

    fn fs(&self) -> Result<&dyn FileSystem> {
        self.fs
            .as_deref()
            .ok_or_else(|| DiskError::filesystem("no filesystem mounted; use 'mount'"))
    }

    fn fs_mut(&mut self) -> Result<&mut Box<dyn FileSystem>> {
        self.fs
            .as_mut()
            .ok_or_else(|| DiskError::filesystem("no filesystem mounted; use 'mount'"))
    }

    fn mmb(&mut self) -> Result<&mut MmbFile> {
        self.mmb
            .as_mut()
            .ok_or_else(|| DiskError::filesystem("no MMB file open; use 'mmb-open'"))
    }

    /// Take the image back from a mounted filesystem
    fn unmount(&mut self) {
        if let Some(fs) = self.fs.take() {
            self.image = Some(fs.into_image());
        }
    }

    fn take_image(&mut self) -> Result<DiskImage> {
        self.unmount();
        self.image
            .take()
            .ok_or_else(|| DiskError::filesystem("no image open; use 'open' or 'new'"))
    }

    fn set_image(&mut self, image: DiskImage) {
        self.fs = None;
        self.image = Some(image);
    }

    fn mount(&mut self, fs_type: Option<FileSystemType>) -> Result<()> {
        let image = self.take_image()?;
        let mounted = match fs_type {
            Some(fs_type) => fs_type.mount(image),
            None => FileSystemRegistry::default().mount(image),
        };
        match mounted {
            Ok(fs) => {
                println!("Mounted {}", fs.name());
                self.fs = Some(fs);
                Ok(())
            }
            Err(e) => {
                let (error, image) = e.into_parts();
                self.image = Some(image);
                Err(error)
            }
        }
    }

    fn run(&mut self, command: &str, args: &[String]) -> Result<()> {
        match command {
            "help" => print_help(),
            "open" => {
                let path = arg(args, 0, "open <path>")?;
                let image = DiskImage::open(path)?;
                println!("Opened {} ({} image, {})", path, image.format(), image.geometry());
                self.set_image(image);
            }
            "new" => {
                let format = arg(args, 0, "new <format> <geometry>")?;
                let format = DiskImageFormat::from_name(format)
                    .ok_or_else(|| DiskError::UnsupportedFormat(format.to_string()))?;
                let geometry = preset(arg(args, 1, "new <format> <geometry>")?)?;
                let image = DiskImage::create(format, geometry)?;
                println!("Created new {} image, {}", format, geometry);
                self.set_image(image);
            }
            "geometry" => {
                let geometry = preset(arg(args, 0, "geometry <preset>")?)?;
                let mut image = self.take_image()?;
                let result = image.set_geometry(geometry);
                self.image = Some(image);
                result?;
                println!("Geometry set to {}", geometry);
            }
            "info" => print_info(self.image()?),
            "tracks" => list_tracks(self.image()?)?,
            "sectors" => {
                let track = number(arg(args, 0, "sectors <track> [side]")?)?;
                let side = args.get(1).map(|s| number(s)).transpose()?.unwrap_or(0);
                list_sectors(self.image()?, track, side)?;
            }
            "read" => {
                let image = self.image()?;
                let (label, data) = match args.len() {
                    1 => {
                        let lsn: u32 = parse_number(&args[0])?;
                        (format!("LSN {}", lsn), image.read_lsn(lsn)?)
                    }
                    3 => {
                        let (track, side, n) = (number(&args[0])?, number(&args[1])?, number(&args[2])?);
                        (
                            format!("Track {} side {} sector {}", track, side, n),
                            image.logical_sector(track, side, n)?,
                        )
                    }
                    _ => return Err(usage("read <lsn> | read <track> <side> <sector>")),
                };
                println!("{} ({} bytes):", label, data.len());
                print_hex_dump(data, data.len());
            }
            "mount" => {
                let fs_type = match args.first() {
                    Some(name) => Some(
                        FileSystemType::from_name(name)
                            .ok_or_else(|| DiskError::UnsupportedFormat(name.clone()))?,
                    ),
                    None => None,
                };
                self.mount(fs_type)?;
            }
            "umount" => self.unmount(),
            "format" => {
                let name = arg(args, 0, "format <dragondos|fat12|os9|dos68|dfs>")?;
                let fs_type = FileSystemType::from_name(name)
                    .ok_or_else(|| DiskError::UnsupportedFormat(name.to_string()))?;
                let mut image = self.take_image()?;
                let result = fs_type.init(&mut image);
                self.image = Some(image);
                result?;
                self.mount(Some(fs_type))?;
            }
            "ls" => list_files(self.fs()?),
            "tree" => {
                let fs = self.fs()?;
                print_tree(fs.root(), 0);
            }
            "extract" => {
                let name = arg(args, 0, "extract <name> [output] [header]")?;
                let with_header = args.iter().skip(1).any(|a| a.eq_ignore_ascii_case("header"));
                let output = args
                    .iter()
                    .skip(1)
                    .find(|a| !a.eq_ignore_ascii_case("header"))
                    .map(PathBuf::from)
                    .unwrap_or_else(|| host_name(name));
                let data = self.fs()?.extract_file(name, with_header)?;
                std::fs::write(&output, &data)?;
                println!("Extracted {} ({} bytes) to {}", name, data.len(), output.display());
            }
            "insert" => {
                let path = arg(args, 0, "insert <host file> [name] [text]")?;
                let text = args.iter().skip(1).any(|a| a.eq_ignore_ascii_case("text"));
                let name = args
                    .iter()
                    .skip(1)
                    .find(|a| !a.eq_ignore_ascii_case("text"))
                    .cloned()
                    .unwrap_or_else(|| {
                        Path::new(path)
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| path.clone())
                    });
                let data = std::fs::read(path)?;
                self.fs_mut()?.insert_file(&name, &data, !text)?;
                println!("Inserted {} ({} bytes)", name, data.len());
            }
            "delete" => {
                let name = arg(args, 0, "delete <name>")?;
                self.fs_mut()?.delete_file(name)?;
                println!("Deleted {}", name);
            }
            "save" => {
                let path = match args.first() {
                    Some(path) => PathBuf::from(path),
                    None => self
                        .image()?
                        .filename()
                        .map(PathBuf::from)
                        .ok_or_else(|| usage("save <path>"))?,
                };
                match self.fs.as_mut() {
                    Some(fs) => fs.save(&path)?,
                    None => match self.image.as_mut() {
                        Some(image) => image.save(&path)?,
                        None => return Err(DiskError::filesystem("no image open")),
                    },
                }
                println!("Saved to {}", path.display());
            }
            "convert" => {
                let format = arg(args, 0, "convert <format> <path>")?;
                let format = DiskImageFormat::from_name(format)
                    .ok_or_else(|| DiskError::UnsupportedFormat(format.to_string()))?;
                let path = arg(args, 1, "convert <format> <path>")?;
                let mut copy = self.image()?.clone();
                copy.set_format(format);
                copy.save(path)?;
                println!("Wrote {} image to {}", format, path);
            }
            "mmb-new" => {
                let path = arg(args, 0, "mmb-new <path> <slots>")?;
                let slots = parse_number(arg(args, 1, "mmb-new <path> <slots>")?)?;
                self.mmb = Some(MmbFile::create(path, slots)?);
                println!("Created {} with {} slots", path, slots);
            }
            "mmb-open" => {
                let path = arg(args, 0, "mmb-open <path>")?;
                let mmb = MmbFile::open(path)?;
                println!("Opened {} ({} slots)", path, mmb.slots());
                self.mmb = Some(mmb);
            }
            "mmb-ls" => {
                let mmb = self.mmb()?;
                let boot = mmb.boot_slots();
                println!("Boot slots: {} {} {} {}", boot[0], boot[1], boot[2], boot[3]);
                for (slot, entry) in mmb.entries().iter().enumerate() {
                    if entry.attribute.is_formatted() || args.first().is_some_and(|a| a == "all") {
                        println!("{:>5}  {:<12}  {}", slot, entry.name, entry.attribute);
                    }
                }
            }
            "mmb-insert" => {
                let slot = parse_number(arg(args, 0, "mmb-insert <slot> [host file]")?)?;
                match args.get(1) {
                    Some(path) => self.mmb()?.insert_image_file(slot, path)?,
                    None => {
                        let bytes = self.image()?.linear_bytes();
                        self.mmb()?.insert_image(slot, &bytes)?;
                    }
                }
                println!("Slot {} written", slot);
            }
            "mmb-extract" => {
                let slot = parse_number(arg(args, 0, "mmb-extract <slot> <path>")?)?;
                let path = arg(args, 1, "mmb-extract <slot> <path>")?;
                self.mmb()?.extract_image_file(slot, path)?;
                println!("Slot {} extracted to {}", slot, path);
            }
            "mmb-mount" => {
                let slot = parse_number(arg(args, 0, "mmb-mount <slot>")?)?;
                let image = self.mmb()?.disk_image(slot)?;
                self.set_image(image);
                self.mount(Some(FileSystemType::AcornDfs))?;
            }
            "mmb-remove" => {
                let slot = parse_number(arg(args, 0, "mmb-remove <slot>")?)?;
                self.mmb()?.remove(slot)?;
                println!("Slot {} emptied", slot);
            }
            "mmb-lock" => {
                let slot = parse_number(arg(args, 0, "mmb-lock <slot>")?)?;
                self.mmb()?.lock(slot)?;
            }
            "mmb-unlock" => {
                let slot = parse_number(arg(args, 0, "mmb-unlock <slot>")?)?;
                self.mmb()?.unlock(slot)?;
            }
            "mmb-boot" => {
                let drive = parse_number(arg(args, 0, "mmb-boot <drive> <slot>")?)?;
                let slot = parse_number(arg(args, 1, "mmb-boot <drive> <slot>")?)?;
                self.mmb()?.set_boot_slot(drive, slot)?;
            }
            "mmb-resize" => {
                let slots = parse_number(arg(args, 0, "mmb-resize <slots>")?)?;
                self.mmb()?.resize(slots)?;
            }
            other => println!("Unknown command: {}. Type 'help' for available commands.", other),
        }
        Ok(())
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("=== rdsk ===");
    println!("Interactive console for 8-bit floppy disk images.");
    println!("Type 'help' for available commands\n");

    let mut rl = match Editor::<CommandCompleter, DefaultHistory>::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Failed to create editor: {}", e);
            return;
        }
    };
    rl.set_helper(Some(CommandCompleter));

    if let Some(history_path) = history_path() {
        let _ = rl.load_history(&history_path);
    }

    let mut session = Session::default();

    loop {
        let input = match rl.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        let parts = parse_command_line(input);
        let Some((command, args)) = parts.split_first() else {
            continue;
        };
        let command = command.to_lowercase();
        if command == "quit" || command == "exit" {
            break;
        }
        if let Err(e) = session.run(&command, args) {
            println!("Error: {}", e);
        }
    }

    if let Some(history_path) = history_path() {
        let _ = rl.save_history(&history_path);
    }
    println!("Goodbye!");
}

/// Parse command line input, respecting quoted strings
fn parse_command_line(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn usage(text: &str) -> DiskError {
    DiskError::filesystem(format!("usage: {}", text))
}

fn arg<'a>(args: &'a [String], index: usize, text: &str) -> Result<&'a String> {
    args.get(index).ok_or_else(|| usage(text))
}

fn parse_number<T: TryFrom<u64>>(s: &str) -> Result<T> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|_| DiskError::filesystem(format!("not a number: {}", s)))?;
    T::try_from(value).map_err(|_| DiskError::filesystem(format!("out of range: {}", s)))
}

fn number(s: &str) -> Result<u8> {
    parse_number(s)
}

fn preset(name: &str) -> Result<Geometry> {
    let geometry = match name.to_ascii_lowercase().as_str() {
        "dragon-ss40" => Geometry::dragon_ss40(),
        "dragon-ss80" => Geometry::dragon_ss80(),
        "dragon-ds40" => Geometry::dragon_ds40(),
        "dragon-ds80" => Geometry::dragon_ds80(),
        "coco-35" => Geometry::coco_35(),
        "pc-360k" => Geometry::pc_360k(),
        "pc-720k" => Geometry::pc_720k(),
        "pc-1440k" => Geometry::pc_1440k(),
        "acorn-ssd40" => Geometry::acorn_ssd40(),
        "acorn-ssd80" => Geometry::acorn_ssd80(),
        "dos68-35" => Geometry::dos68_35(),
        "dos68-40" => Geometry::dos68_40(),
        "dos68-77" => Geometry::dos68_77(),
        _ => {
            return Err(DiskError::UnsupportedFormat(format!(
                "{} (presets: {})",
                name,
                PRESETS.join(", ")
            )))
        }
    };
    Ok(geometry)
}

/// Host file name for an extracted file: the last path component
fn host_name(name: &str) -> PathBuf {
    let last = name.rsplit('/').next().unwrap_or(name);
    PathBuf::from(last.replace(['\\', ':'], "_"))
}

fn print_help() {
    println!("Available commands:");
    println!("  open <path>                    - Open a disk image file (use quotes for paths with spaces)");
    println!("  new <format> <geometry>        - Create a blank image (raw|edsk|imd|jvc|vdk, e.g. dragon-ss40)");
    println!("  geometry <preset>              - Reslice a RAW image under another geometry");
    println!("  info                           - Show image information");
    println!("  tracks                         - List all tracks");
    println!("  sectors <track> [side]         - List the sectors of a track");
    println!("  read <lsn> | <t> <s> <n>       - Hex dump a sector");
    println!("  mount [fs]                     - Mount a filesystem (dragondos|fat12|os9|dos68|dfs, default: detect)");
    println!("  umount                         - Unmount the filesystem, keeping its image open");
    println!("  format <fs>                    - Write an empty filesystem and mount it");
    println!("  ls                             - List files");
    println!("  tree                           - Show the directory tree");
    println!("  extract <name> [out] [header]  - Copy a file to the host");
    println!("  insert <file> [name] [text]    - Copy a host file onto the disk");
    println!("  delete <name>                  - Delete a file");
    println!("  save [path]                    - Save the image in its own format");
    println!("  convert <format> <path>        - Save a copy in another container format");
    println!("  mmb-new <path> <slots>         - Create an MMB file");
    println!("  mmb-open <path>                - Open an MMB file");
    println!("  mmb-ls [all]                   - List MMB slots");
    println!("  mmb-insert <slot> [file]       - Store a file, or the open image, in a slot");
    println!("  mmb-extract <slot> <path>      - Write a slot to a file");
    println!("  mmb-mount <slot>               - Open a slot as a DFS image");
    println!("  mmb-remove <slot>              - Empty a slot");
    println!("  mmb-lock / mmb-unlock <slot>   - Lock or unlock a slot");
    println!("  mmb-boot <drive> <slot>        - Set the slot loaded into a drive at boot");
    println!("  mmb-resize <slots>             - Grow the MMB file");
    println!("  help                           - Show this help");
    println!("  quit, exit                     - Exit");
}

fn print_info(image: &DiskImage) {
    if let Some(filename) = image.filename() {
        println!("Filename: {}", filename);
    }
    println!("Format: {}", image.format().name());
    if let Some(name) = vdk::disk_name(image) {
        println!("Disk name: {}", name);
    }
    let geometry = image.geometry();
    println!("Sides: {}", geometry.sides);
    println!("Tracks per side: {}", geometry.tracks);
    println!("Sectors per track: {}", geometry.sectors_per_track);
    println!("Sector size: {} bytes", geometry.sector_size);
    println!("First sector ID: {}", geometry.first_sector_id);
    println!("Total capacity: {} KB", image.total_bytes() / 1024);
    println!("Changed: {}", if image.is_changed() { "Yes" } else { "No" });
}

fn list_tracks(image: &DiskImage) -> Result<()> {
    for side in 0..image.sides() {
        println!("\nSide {}:", side);
        println!("{:<6} {:<10} {:<8} {:<11}", "Track", "Data Size", "Sectors", "Status");
        println!("{}", "-".repeat(38));
        for track in 0..image.tracks() {
            let info = image.track_info(track, side)?;
            let status = if info.formatted { "Formatted" } else { "Unformatted" };
            println!(
                "{:<6} {:<10} {:<8} {:<11}",
                info.track_number, info.data_size, info.sectors_num, status
            );
        }
    }
    Ok(())
}

fn list_sectors(image: &DiskImage, track: u8, side: u8) -> Result<()> {
    let info = image.track_info(track, side)?;
    println!(
        "{:<6} {:<6} {:<6} {:<6} {:<8} {:<8} {:<8} {:<6}",
        "Index", "Track", "Side", "ID", "Size", "Stored", "Flags", "In use"
    );
    println!("{}", "-".repeat(60));
    for index in 0..info.sectors_num as u8 {
        let sector = image.sector_info(track, side, index)?;
        let flags = format!(
            "{}{}{}",
            if sector.has_errors { "E" } else { "-" },
            if sector.is_deleted { "D" } else { "-" },
            if sector.is_weak { "W" } else { "-" }
        );
        println!(
            "{:<6} {:<6} {:<6} {:<6} {:<8} {:<8} {:<8} {:<6}",
            index,
            sector.id.track,
            sector.id.side,
            sector.id.sector,
            sector.declared_size,
            sector.data_length,
            flags,
            if sector.in_use { "Yes" } else { "No" }
        );
    }
    Ok(())
}

fn list_files(fs: &dyn FileSystem) {
    let variant = fs.variant();
    if variant.is_empty() {
        println!("{} volume \"{}\"", fs.name(), fs.volume_label());
    } else {
        println!("{} ({}) volume \"{}\"", fs.name(), variant, fs.volume_label());
    }
    println!("{:<32} {:>8} {:>4}", "Name", "Size", "Attr");
    println!("{}", "-".repeat(46));
    for index in 0..fs.files_num() {
        if let Some(info) = fs.file_info(index) {
            let attrs = format!(
                "{}{}{}",
                if info.attributes.directory { "D" } else { "-" },
                if info.attributes.protected { "P" } else { "-" },
                if info.ok { "-" } else { "!" }
            );
            println!("{:<32} {:>8} {:>4}", info.name, info.size, attrs);
        }
    }
    println!("{} file(s), {} bytes free", fs.files_num(), fs.free_size());
}

fn print_tree(entry: &DirectoryEntry, depth: usize) {
    let marker = if entry.is_directory { "/" } else { "" };
    println!("{}{}{}", "  ".repeat(depth), entry.name, marker);
    for child in &entry.children {
        print_tree(child, depth + 1);
    }
}

fn print_hex_dump(data: &[u8], max_bytes: usize) {
    let len = data.len().min(max_bytes);

    for (i, chunk) in data[..len].chunks(16).enumerate() {
        print!("{:04X}: ", i * 16);
        for (j, byte) in chunk.iter().enumerate() {
            print!("{:02X} ", byte);
            if j == 7 {
                print!(" ");
            }
        }
        // pad a short last line
        for j in chunk.len()..16 {
            print!("   ");
            if j == 7 {
                print!(" ");
            }
        }
        print!(" |");
        for byte in chunk {
            let c = if (32..127).contains(byte) { *byte as char } else { '.' };
            print!("{}", c);
        }
        println!("|");
    }

    if data.len() > max_bytes {
        println!("... ({} more bytes)", data.len() - max_bytes);
    }
}
