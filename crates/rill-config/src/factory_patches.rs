//! Factory patches bundled with the library.
//!
//! These are always available without external files and double as examples
//! of the patch format.

use crate::Patch;

/// Array of factory patch names for external access.
pub static FACTORY_PATCH_NAMES: &[&str] = &["sine", "feedback", "silence", "chord"];

/// TOML content for factory patches.
static FACTORY_PATCHES_TOML: &[(&str, &str)] = &[
    ("sine", SINE_PATCH),
    ("feedback", FEEDBACK_PATCH),
    ("silence", SILENCE_PATCH),
    ("chord", CHORD_PATCH),
];

/// A4 at half level on both channels.
const SINE_PATCH: &str = r#"
name = "sine"
description = "440 Hz sine at half level on both channels"

[[nodes]]
id = "osc"
type = "sine"
args = [440.0]

[[nodes]]
id = "level"
type = "const"
args = [0.5]

[[nodes]]
id = "amp"
type = "product"

[[nodes]]
id = "left"
type = "out"
args = [0]

[[nodes]]
id = "right"
type = "out"
args = [1]

[[edges]]
from = "osc"
to = "amp"
port = "$0"

[[edges]]
from = "level"
to = "amp"
port = "$1"

[[edges]]
from = "amp"
to = "left"
port = "in"

[[edges]]
from = "amp"
to = "right"
port = "in"
"#;

/// One-pole lowpass over white noise: `y = 0.02 * noise + 0.98 * y'`.
const FEEDBACK_PATCH: &str = r#"
name = "feedback"
description = "Lowpassed noise through a one-block feedback loop"

[[nodes]]
id = "noise"
type = "noise"
args = [1]

[[nodes]]
id = "drive"
type = "const"
args = [0.02]

[[nodes]]
id = "decay"
type = "const"
args = [0.98]

[[nodes]]
id = "input"
type = "product"

[[nodes]]
id = "tail"
type = "product"

[[nodes]]
id = "y"
type = "sum"

[[nodes]]
id = "clean"
type = "zap"

[[nodes]]
id = "left"
type = "out"
args = [0]

[[nodes]]
id = "right"
type = "out"
args = [1]

[[edges]]
from = "noise"
to = "input"
port = "$0"

[[edges]]
from = "drive"
to = "input"
port = "$1"

[[edges]]
from = "input"
to = "y"
port = "$0"

[[edges]]
from = "tail"
to = "y"
port = "$1"

[[edges]]
from = "y"
to = "tail"
port = "$0"

[[edges]]
from = "decay"
to = "tail"
port = "$1"

[[edges]]
from = "y"
to = "clean"
port = "in"

[[edges]]
from = "clean"
to = "left"
port = "in"

[[edges]]
from = "clean"
to = "right"
port = "in"
"#;

/// Constant zero on both channels.
const SILENCE_PATCH: &str = r#"
name = "silence"
description = "Zero on both channels"

[[nodes]]
id = "zero"
type = "const"
args = [0.0]

[[nodes]]
id = "left"
type = "out"
args = [0]

[[nodes]]
id = "right"
type = "out"
args = [1]

[[edges]]
from = "zero"
to = "left"
port = "in"

[[edges]]
from = "zero"
to = "right"
port = "in"
"#;

/// A minor triad with the root panned left and the fifth right.
const CHORD_PATCH: &str = r#"
name = "chord"
description = "A minor triad, root left, fifth right, third in the middle"

[[nodes]]
id = "root"
type = "sine"
args = [220.0]

[[nodes]]
id = "third"
type = "sine"
args = [261.63]

[[nodes]]
id = "fifth"
type = "saw"
args = [329.63]

[[nodes]]
id = "level"
type = "const"
args = [0.2]

[[nodes]]
id = "mix_l"
type = "sum"

[[nodes]]
id = "mix_r"
type = "sum"

[[nodes]]
id = "amp_l"
type = "product"

[[nodes]]
id = "amp_r"
type = "product"

[[nodes]]
id = "left"
type = "out"
args = [0]

[[nodes]]
id = "right"
type = "out"
args = [1]

[[edges]]
from = "root"
to = "mix_l"
port = "$0"

[[edges]]
from = "third"
to = "mix_l"
port = "$1"

[[edges]]
from = "third"
to = "mix_r"
port = "$0"

[[edges]]
from = "fifth"
to = "mix_r"
port = "$1"

[[edges]]
from = "mix_l"
to = "amp_l"
port = "$0"

[[edges]]
from = "level"
to = "amp_l"
port = "$1"

[[edges]]
from = "mix_r"
to = "amp_r"
port = "$0"

[[edges]]
from = "level"
to = "amp_r"
port = "$1"

[[edges]]
from = "amp_l"
to = "left"
port = "in"

[[edges]]
from = "amp_r"
to = "right"
port = "in"
"#;

/// Get all factory patches.
///
/// Patches that fail to parse are skipped, which can only happen if the
/// embedded TOML is edited badly; the tests below guard against that.
pub fn factory_patches() -> Vec<Patch> {
    FACTORY_PATCHES_TOML
        .iter()
        .filter_map(|(_, toml)| Patch::from_toml(toml).ok())
        .collect()
}

/// Get a factory patch by name (case-insensitive).
pub fn get_factory_patch(name: &str) -> Option<Patch> {
    let lower = name.to_lowercase();
    FACTORY_PATCHES_TOML
        .iter()
        .find(|(n, _)| *n == lower)
        .and_then(|(_, toml)| Patch::from_toml(toml).ok())
}

/// Returns true if `name` is a factory patch.
pub fn is_factory_patch(name: &str) -> bool {
    let lower = name.to_lowercase();
    FACTORY_PATCH_NAMES.contains(&lower.as_str())
}
