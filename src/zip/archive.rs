use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::{debug, info, trace, warn};

use crate::error::{Result, ZipError};
use crate::io::{BinaryRead, RandomAccessFile};

use super::allocator::BuddyAllocator;
use super::entry::ArchiveEntry;
use super::extractor::ZipExtractor;
use super::options::ArchiveOptions;
use super::parser::{TrailerInfo, ZipParser};
use super::progress::{NoProgress, ProgressSink};
use super::source::{EntrySource, sort_largest_first};
use super::structures::EndOfCentralDirectory;

/// A ZIP file that can gain and lose entries in place.
///
/// Entries live in power-of-two blocks handed out by a [`BuddyAllocator`],
/// followed by the central directory and the end-of-central-directory record.
/// Adding an entry writes only its own block plus the directory records that
/// changed; removing one frees its block for later reuse. Every mutating call
/// leaves the local headers, directory and trailer consistent with each other.
///
/// The handle has a single owner: mutations and reads take `&mut self` because
/// they share one file cursor. Share it across threads behind a mutex.
pub struct ZipArchive {
    source: RandomAccessFile,
    /// Directory order, which is also the on-disk record order.
    entries: Vec<ArchiveEntry>,
    index: HashMap<String, usize>,
    allocator: BuddyAllocator,
    options: ArchiveOptions,
    cd_start: u64,
    eocd_position: u64,
}

/// A compressed entry waiting for a block.
struct Prepared {
    entry: ArchiveEntry,
    data: Vec<u8>,
}

/// A pending relocation found by the repair pass.
struct Move {
    index: usize,
    /// Old header position.
    from: u64,
    /// Old payload position, after any extra field.
    payload: u64,
    to: u64,
    /// Payload read early because an earlier move overwrites it.
    cached: Option<Vec<u8>>,
}

impl ZipArchive {
    /// Open (or create) `path` for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ArchiveOptions::default())
    }

    /// Open an existing archive without allowing modification.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ArchiveOptions::default().read_only(true))
    }

    pub fn open_with(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let file = if options.read_only {
            File::open(path.as_ref())?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path.as_ref())?
        };
        let source = RandomAccessFile::with_capacity(file, options.write_buffer_size)?;

        let mut archive = Self {
            source,
            entries: Vec::new(),
            index: HashMap::new(),
            allocator: BuddyAllocator::with_min_shift(options.min_block_shift),
            options,
            cd_start: 0,
            eocd_position: 0,
        };
        archive.init()?;
        debug!(
            path = %path.as_ref().display(),
            entries = archive.entries.len(),
            directory = archive.cd_start,
            read_only = archive.options.read_only,
            "opened archive"
        );
        Ok(archive)
    }

    fn init(&mut self) -> Result<()> {
        if self.source.is_empty()? {
            if !self.options.read_only {
                self.write_eocd()?;
                self.source.flush()?;
            }
            return Ok(());
        }

        let (trailer, entries) = {
            let mut parser = ZipParser::new(&mut self.source)?;
            let trailer = parser.find_eocd()?;
            let entries = parser.read_directory(&trailer.eocd)?;
            (trailer, entries)
        };

        self.cd_start = trailer.eocd.cd_offset as u64;
        self.eocd_position = self.cd_start + entries.iter().map(|e| e.directory_record_size()).sum::<u64>();
        self.entries = entries;
        self.rebuild_index();

        if self.options.read_only {
            // Records on disk may carry extra fields or comments.
            self.eocd_position = trailer.offset;
            return Ok(());
        }
        self.repair(&trailer)
    }

    /// Rebuild allocator state from the entries on disk, relocating entries
    /// that do not sit on a block of their own, then rewrite the directory.
    fn repair(&mut self, trailer: &TrailerInfo) -> Result<()> {
        let file_size = self.source.len()?;
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&i| self.entries[i].header_position());

        let mut moves = Vec::new();
        let mut cursor = 0u64;
        let mut new_cd_start = 0u64;
        for i in order {
            let entry = &self.entries[i];
            let local = ZipParser::new(&mut self.source)?.read_local_header(entry)?;
            let payload = entry.header_position() + local.size();
            if payload + entry.compressed_size() > file_size {
                return Err(ZipError::format(format!(
                    "data of \"{}\" extends past end of file",
                    entry.name()
                )));
            }

            // Headers with extra fields or a different name are rewritten.
            let clean = local.extra_length == 0 && local.name == entry.name();
            let total = entry.total_size();
            let placed = clean
                && entry.header_position() >= cursor
                && self.allocator.allocate_at(total, entry.header_position());
            let position = if placed {
                entry.header_position()
            } else {
                self.allocator.allocate_after(total, cursor)
            };

            if position != entry.header_position() || !clean {
                moves.push(Move {
                    index: i,
                    from: entry.header_position(),
                    payload,
                    to: position,
                    cached: None,
                });
            }
            cursor = position + total;
            new_cd_start = new_cd_start.max(cursor);
        }

        if !moves.is_empty() {
            info!(count = moves.len(), "relocating entries");
        }
        self.execute_moves(moves)?;

        let moved_directory = new_cd_start != self.cd_start;
        self.write_directory(new_cd_start)?;

        let expected = self.trailer();
        if moved_directory || trailer.eocd != expected || trailer.offset != self.eocd_position {
            self.write_eocd()?;
        }
        self.source.flush()?;
        Ok(())
    }

    /// Copy entries to their new blocks.
    ///
    /// Entries moving down go first in ascending order, then entries moving up
    /// from the highest target down. A payload that a copy would overwrite
    /// before it is moved is read into memory first.
    fn execute_moves(&mut self, moves: Vec<Move>) -> Result<()> {
        let (mut down, mut up): (Vec<Move>, Vec<Move>) = moves.into_iter().partition(|m| m.to <= m.from);
        down.sort_by_key(|m| m.to);
        up.sort_by_key(|m| Reverse(m.to));
        let mut pending: Vec<Move> = down.into_iter().chain(up).collect();

        for step in 0..pending.len() {
            let (index, payload_at, to) = (pending[step].index, pending[step].payload, pending[step].to);
            let size = self.entries[index].compressed_size();
            let data = match pending[step].cached.take() {
                Some(data) => data,
                None => {
                    self.source.seek_to(payload_at)?;
                    self.source.read_byte_array(size as usize)?
                }
            };

            let target_end = to + self.entries[index].total_size();
            for later in pending.iter_mut().skip(step + 1) {
                let later_size = self.entries[later.index].compressed_size();
                let overlaps = later.payload < target_end && to < later.payload + later_size;
                if later.cached.is_none() && overlaps {
                    self.source.seek_to(later.payload)?;
                    later.cached = Some(self.source.read_byte_array(later_size as usize)?);
                }
            }

            trace!(name = self.entries[index].name(), from = pending[step].from, to, "moving entry");
            let entry = &mut self.entries[index];
            entry.set_header_position(to);
            self.source.seek_to(to)?;
            entry.write_local_header(&mut self.source)?;
            self.source.write_all(&data)?;
        }
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name().to_string(), i))
            .collect();
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.options.read_only {
            return Err(ZipError::ReadOnly);
        }
        Ok(())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Entries in directory order.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = &ArchiveEntry> {
        self.entries.iter()
    }

    /// Offset of the central directory.
    pub fn directory_start(&self) -> u64 {
        self.cd_start
    }

    /// Offset of the end-of-central-directory record.
    pub fn directory_end(&self) -> u64 {
        self.eocd_position
    }

    /// Size of the range managed by the allocator.
    pub fn allocated_extent(&self) -> u64 {
        self.allocator.extent()
    }

    pub fn allocator(&self) -> &BuddyAllocator {
        &self.allocator
    }

    /// Decompress `entry` and verify its size and CRC32.
    pub fn extract(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        ZipExtractor::new(&mut self.source).extract_to_memory(entry)
    }

    pub fn extract_named(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .get(name)
            .cloned()
            .ok_or_else(|| ZipError::NotMember(name.to_string()))?;
        self.extract(&entry)
    }

    /// The payload of `entry` exactly as stored (deflated or not).
    pub fn compressed_bytes(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        ZipExtractor::new(&mut self.source).compressed_bytes(entry)
    }

    /// Add an entry holding `data`.
    pub fn add_bytes(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<ArchiveEntry> {
        self.add(EntrySource::from_bytes(name, data))
    }

    /// Add an entry holding the contents of the file at `path`.
    pub fn add_file(&mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Result<ArchiveEntry> {
        self.add(EntrySource::from_file(name, path)?)
    }

    /// Write one entry and update the directory.
    ///
    /// An existing entry with the same name is replaced. The source is
    /// compressed before anything changes, so a source that cannot be read
    /// leaves the archive untouched.
    pub fn add(&mut self, source: EntrySource) -> Result<ArchiveEntry> {
        self.ensure_writable()?;
        let prepared = self.prepare(source)?;
        let result = self.add_prepared(prepared);
        result.map_err(|err| self.restore(err))
    }

    fn add_prepared(&mut self, prepared: Prepared) -> Result<ArchiveEntry> {
        let replaced = self.contains(prepared.entry.name());
        if replaced {
            self.detach(prepared.entry.name());
        }

        let entry = self.place(prepared)?;
        if replaced {
            let start = self.max_entry_end();
            self.write_directory(start)?;
        } else if entry.end_position() > self.cd_start {
            self.write_directory(entry.end_position())?;
        } else {
            self.source.seek_to(self.cd_start + entry.directory_offset())?;
            entry.write_directory_record(&mut self.source)?;
        }
        self.write_eocd()?;
        self.source.flush()?;

        debug!(name = entry.name(), position = entry.header_position(), "added entry");
        Ok(entry)
    }

    /// Add several entries, rewriting the directory once at the end.
    pub fn add_all(&mut self, sources: Vec<EntrySource>) -> Result<Vec<ArchiveEntry>> {
        self.add_all_with_progress(sources, &mut NoProgress)
    }

    /// Add several entries, largest first, reporting each one to `progress`.
    ///
    /// When a name occurs more than once the last source wins. Existing
    /// entries with the same names are replaced. Every source is compressed
    /// before the first block is written; if one fails the archive is left
    /// as it was.
    pub fn add_all_with_progress<P: ProgressSink + ?Sized>(
        &mut self,
        sources: Vec<EntrySource>,
        progress: &mut P,
    ) -> Result<Vec<ArchiveEntry>> {
        self.ensure_writable()?;
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let mut last: HashMap<String, usize> = HashMap::new();
        for (i, source) in sources.iter().enumerate() {
            last.insert(source.name().to_string(), i);
        }
        let mut sources: Vec<EntrySource> = sources
            .into_iter()
            .enumerate()
            .filter(|(i, s)| last.get(s.name()) == Some(i))
            .map(|(_, s)| s)
            .collect();
        sort_largest_first(&mut sources);

        let mut batch = Vec::with_capacity(sources.len());
        for source in sources {
            let name = source.name().to_string();
            match self.prepare(source) {
                Ok(prepared) => batch.push(prepared),
                Err(err) => {
                    warn!(name = %name, error = %err, "cannot prepare entry, batch not written");
                    return Err(err);
                }
            }
        }

        let result = self.add_prepared_batch(batch, progress);
        result.map_err(|err| self.restore(err))
    }

    fn add_prepared_batch<P: ProgressSink + ?Sized>(
        &mut self,
        batch: Vec<Prepared>,
        progress: &mut P,
    ) -> Result<Vec<ArchiveEntry>> {
        let mut replaced = false;
        for prepared in &batch {
            if self.contains(prepared.entry.name()) {
                self.detach(prepared.entry.name());
                replaced = true;
            }
        }

        let max = batch.len();
        let mut end_of_entries = self.cd_start;
        let mut added = Vec::with_capacity(max);
        for (i, prepared) in batch.into_iter().enumerate() {
            let entry = self.place(prepared)?;
            progress.update(i + 1, max, entry.name());
            end_of_entries = end_of_entries.max(entry.end_position());
            added.push(entry);
        }

        let start = if replaced { self.max_entry_end() } else { end_of_entries };
        self.write_directory(start)?;
        self.write_eocd()?;
        self.source.flush()?;

        info!(count = added.len(), directory = self.cd_start, "added entries");
        Ok(added)
    }

    /// Remove `entry`, freeing its block and compacting the directory.
    ///
    /// # Errors
    ///
    /// [`ZipError::NotMember`] if `entry` is not the archive's current entry
    /// of that name.
    pub fn remove(&mut self, entry: &ArchiveEntry) -> Result<()> {
        self.ensure_writable()?;
        self.check_member(entry)?;

        self.detach(entry.name());
        let start = self.max_entry_end();
        self.write_directory(start)?;
        self.write_eocd()?;
        self.source.flush()?;

        debug!(name = entry.name(), "removed entry");
        Ok(())
    }

    pub fn remove_named(&mut self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        let entry = self
            .get(name)
            .cloned()
            .ok_or_else(|| ZipError::NotMember(name.to_string()))?;
        self.remove(&entry)
    }

    /// Remove several entries, rewriting the directory once.
    ///
    /// Membership of every entry is checked before anything is removed.
    pub fn remove_all(&mut self, entries: &[ArchiveEntry]) -> Result<()> {
        self.ensure_writable()?;
        let mut names = HashSet::new();
        for entry in entries {
            self.check_member(entry)?;
            if !names.insert(entry.name()) {
                return Err(ZipError::NotMember(entry.name().to_string()));
            }
        }
        if entries.is_empty() {
            return Ok(());
        }

        for entry in entries {
            self.detach(entry.name());
        }
        // The end of the remaining entries only shrinks with each removal.
        let start = self.max_entry_end().min(self.cd_start);
        self.write_directory(start)?;
        self.write_eocd()?;
        self.source.flush()?;

        info!(count = entries.len(), directory = self.cd_start, "removed entries");
        Ok(())
    }

    /// Flush pending writes and release the file.
    pub fn close(self) -> Result<()> {
        Ok(self.source.close()?)
    }

    fn check_member(&self, entry: &ArchiveEntry) -> Result<()> {
        match self.index.get(entry.name()) {
            Some(&i) if self.entries[i] == *entry => Ok(()),
            _ => Err(ZipError::NotMember(entry.name().to_string())),
        }
    }

    /// Compress `source` and build its entry without touching the archive.
    fn prepare(&self, source: EntrySource) -> Result<Prepared> {
        let name = source.name().to_string();
        let modified = source.modified();
        let info = source.compress(self.options.compression_level)?;

        let entry = ArchiveEntry::new(
            name,
            info.compression,
            modified,
            info.crc32,
            info.compressed_size(),
            info.uncompressed_size,
            0,
            0,
        )?;
        Ok(Prepared {
            entry,
            data: info.data,
        })
    }

    /// Write a prepared entry into a fresh block and append its record to the
    /// in-memory directory. The on-disk directory is left to the caller.
    fn place(&mut self, prepared: Prepared) -> Result<ArchiveEntry> {
        let Prepared { mut entry, data } = prepared;
        entry.set_directory_offset(self.eocd_position - self.cd_start);

        let position = self.allocator.allocate(entry.total_size());
        entry.set_header_position(position);
        if entry.end_position() > u32::MAX as u64 {
            self.allocator.free(position, entry.total_size());
            return Err(ZipError::TooLarge(entry.end_position()));
        }

        let written = self
            .source
            .seek_to(position)
            .map_err(ZipError::from)
            .and_then(|()| entry.write_local_header(&mut self.source))
            .and_then(|()| Ok(self.source.write_all(&data)?));
        if let Err(err) = written {
            self.allocator.free(position, entry.total_size());
            return Err(err);
        }

        self.index.insert(entry.name().to_string(), self.entries.len());
        self.eocd_position += entry.directory_record_size();
        self.entries.push(entry.clone());
        trace!(name = entry.name(), position, size = entry.total_size(), "placed entry");
        Ok(entry)
    }

    /// Bring the on-disk directory and trailer back in line with memory after
    /// a mutation failed halfway, then hand back the original error.
    fn restore(&mut self, err: ZipError) -> ZipError {
        let start = self.max_entry_end().max(self.cd_start);
        let rewritten = self
            .write_directory(start)
            .and_then(|()| self.write_eocd())
            .and_then(|()| Ok(self.source.flush()?));
        if let Err(restore_err) = rewritten {
            warn!(error = %restore_err, "could not rewrite directory after failed mutation");
        }
        err
    }

    /// Drop `name` from the in-memory directory and free its block.
    fn detach(&mut self, name: &str) {
        let Some(i) = self.index.get(name).copied() else {
            return;
        };
        let removed = self.entries.remove(i);
        self.allocator.free(removed.header_position(), removed.total_size());

        let shift = removed.directory_record_size();
        for entry in &mut self.entries {
            if entry.directory_offset() > removed.directory_offset() {
                entry.set_directory_offset(entry.directory_offset() - shift);
            }
        }
        self.eocd_position -= shift;
        self.rebuild_index();
    }

    fn max_entry_end(&self) -> u64 {
        self.entries.iter().map(|e| e.end_position()).max().unwrap_or(0)
    }

    /// Write every directory record at `position`, moving the directory there.
    fn write_directory(&mut self, position: u64) -> Result<()> {
        let size = self.eocd_position - self.cd_start;
        self.cd_start = position;
        self.eocd_position = position + size;
        if self.eocd_position > u32::MAX as u64 {
            return Err(ZipError::TooLarge(self.eocd_position));
        }

        for entry in &self.entries {
            self.source.seek_to(position + entry.directory_offset())?;
            entry.write_directory_record(&mut self.source)?;
        }
        trace!(position, size, "wrote central directory");
        Ok(())
    }

    fn trailer(&self) -> EndOfCentralDirectory {
        EndOfCentralDirectory::new(
            self.entries.len() as u16,
            self.cd_start as u32,
            (self.eocd_position - self.cd_start) as u32,
        )
    }

    /// Write the trailer and cut the file right after it.
    fn write_eocd(&mut self) -> Result<()> {
        if self.entries.len() > u16::MAX as usize {
            return Err(ZipError::TooLarge(self.entries.len() as u64));
        }
        let trailer = self.trailer();
        self.source.seek_to(self.eocd_position)?;
        trailer.write_to(&mut self.source)?;
        self.source.set_len(self.eocd_position + EndOfCentralDirectory::SIZE as u64)?;
        Ok(())
    }
}

impl std::fmt::Debug for ZipArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchive")
            .field("entries", &self.entries.len())
            .field("cd_start", &self.cd_start)
            .field("eocd_position", &self.eocd_position)
            .field("read_only", &self.options.read_only)
            .finish()
    }
}

