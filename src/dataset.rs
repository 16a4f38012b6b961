use std::fs::{self, File};
use std::path::{Path, PathBuf};

use burn::data::network::downloader;
use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;

/// CIFAR-10 binary archive, see <https://www.cs.toronto.edu/~kriz/cifar.html>.
const URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";
const ARCHIVE_NAME: &str = "cifar-10-binary.tar.gz";
const EXTRACTED_DIR: &str = "cifar-10-batches-bin";

pub const IMAGE_SIZE: usize = 32;
pub const IMAGE_CHANNELS: usize = 3;
pub const IMAGE_BYTES: usize = IMAGE_CHANNELS * IMAGE_SIZE * IMAGE_SIZE;
/// One label byte followed by the image bytes.
pub const RECORD_BYTES: usize = 1 + IMAGE_BYTES;
pub const NUM_CLASSES: usize = 10;
pub const NUM_TRAIN_SHARDS: usize = 5;

pub const LABEL_NAMES: [&str; NUM_CLASSES] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// A raw CIFAR-10 record as stored in the binary shards: a class id in
/// `0..10` and 3072 pixel bytes in channel-major (CHW) order.
#[derive(Clone, Debug)]
pub struct CifarRecord {
    pub label: u8,
    pub image: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed shard {path:?}: {len} bytes is not a positive multiple of {RECORD_BYTES}")]
    MalformedShard { path: PathBuf, len: usize },
}

/// Directory where the archive and the extracted dataset are cached.
pub fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .expect("Could not get cache directory")
        .join("image-classification")
}

/// Path of a raw training shard (`data_batch_1.bin` ... `data_batch_5.bin`).
pub fn train_shard_path(raw_dir: &Path, shard_id: usize) -> PathBuf {
    raw_dir.join(format!("data_batch_{shard_id}.bin"))
}

/// Path of the raw test shard.
pub fn test_shard_path(raw_dir: &Path) -> PathBuf {
    raw_dir.join("test_batch.bin")
}

/// Download the CIFAR-10 archive if it is absent and extract it if the
/// dataset folder is absent. Returns the extracted folder.
///
/// Download progress is reported with a progress bar; the file is written
/// next to the extracted folder so a second run skips both steps.
pub fn download_and_extract(data_dir: &Path) -> Result<PathBuf, DatasetError> {
    let archive = data_dir.join(ARCHIVE_NAME);
    let extracted = data_dir.join(EXTRACTED_DIR);

    fs::create_dir_all(data_dir)?;

    if !archive.exists() {
        log::info!("downloading {URL}");
        let bytes = downloader::download_file_as_bytes(URL, ARCHIVE_NAME);
        fs::write(&archive, bytes)?;
    }

    if !extracted.exists() {
        log::info!("extracting {ARCHIVE_NAME} to {}", data_dir.display());
        let tar_gz = File::open(&archive)?;
        let mut archive = Archive::new(GzDecoder::new(tar_gz));
        archive.unpack(data_dir)?;
    }

    Ok(extracted)
}

/// Read every record of a raw binary shard.
pub fn read_shard(path: &Path) -> Result<Vec<CifarRecord>, DatasetError> {
    let bytes = fs::read(path)?;

    if bytes.is_empty() || bytes.len() % RECORD_BYTES != 0 {
        return Err(DatasetError::MalformedShard {
            path: path.to_path_buf(),
            len: bytes.len(),
        });
    }

    let records = bytes
        .chunks_exact(RECORD_BYTES)
        .map(|chunk| CifarRecord {
            label: chunk[0],
            image: chunk[1..].to_vec(),
        })
        .collect();

    Ok(records)
}
