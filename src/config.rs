// Tunable engine limits. Every size has a default matching the fixed
// layout the engine was designed around; a RON file can override any
// subset of them.

use std::fs::File;

use ron::de::from_reader;
use serde::Deserialize;

#[derive(Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default)]
pub struct VmConfig {
    pub stack_size: usize,
    pub call_stack_size: usize,
    pub loop_stack_size: usize,
    pub switch_stack_size: usize,
    pub global_count: usize,
    // Young-generation object count that triggers a minor collection.
    pub young_threshold: usize,
    // Minor collections an object survives before promotion.
    pub tenure_threshold: u32,
    // Longest input record, in bytes.
    pub input_limit: usize,
}

impl Default for VmConfig {
    fn default() -> VmConfig {
        VmConfig {
            stack_size: 8192,
            call_stack_size: 1024,
            loop_stack_size: 256,
            switch_stack_size: 128,
            global_count: 1024,
            young_threshold: 100,
            tenure_threshold: 4,
            input_limit: 1024,
        }
    }
}

pub type LoadResult = std::result::Result<VmConfig, String>;

pub fn load(path: String) -> LoadResult {
    let file = File::open(&path).map_err(|e| format!("couldn't open {}: {}", path, e))?;
    from_reader(file).map_err(|e| format!("couldn't parse {}: {}", path, e))
}
