// This file defines the customizations to the bindgen builder used to generate the loopcam
// bindings.
//
// It is meant to be included from `src/bindings/runbindgen/src/main.rs`.

#[derive(Debug)]
/// Workaround for https://github.com/rust-lang/rust-bindgen/issues/753.
pub struct Fix753;

impl bindgen::callbacks::ParseCallbacks for Fix753 {
    fn item_name(&self, original_item_name: &str) -> Option<String> {
        Some(original_item_name.trim_start_matches("Fix753_").to_owned())
    }
}

/// Structures exchanged with the kernel by the ioctls we use.
const ALLOWED_TYPES: &[&str] = &[
    "v4l2_buf_type",
    "v4l2_memory",
    "v4l2_field",
    "v4l2_capability",
    "v4l2_format",
    "v4l2_requestbuffers",
    "v4l2_buffer",
];

const ALLOWED_VARS: &[&str] = &[
    "V4L2_CAP_.*",
    "V4L2_BUF_FLAG_.*",
    "V4L2_BUF_CAP_.*",
    "Fix753_.*",
];

/// Union members we never access. Keeping them opaque preserves the size and alignment of the
/// unions without pulling in all their dependencies.
const OPAQUE_TYPES: &[&str] = &[
    "v4l2_pix_format_mplane",
    "v4l2_window",
    "v4l2_vbi_format",
    "v4l2_sliced_vbi_format",
    "v4l2_sdr_format",
    "v4l2_meta_format",
    "v4l2_plane",
];

fn loopcam_bindgen_builder(builder: bindgen::Builder) -> bindgen::Builder {
    let builder = builder
        .parse_callbacks(Box::new(Fix753))
        .derive_partialeq(true)
        .derive_eq(true)
        .derive_default(true);

    let builder = ALLOWED_TYPES
        .iter()
        .fold(builder, |builder, t| builder.allowlist_type(t));
    let builder = ALLOWED_VARS
        .iter()
        .fold(builder, |builder, v| builder.allowlist_var(v));
    OPAQUE_TYPES
        .iter()
        .fold(builder, |builder, t| builder.opaque_type(t))
}
