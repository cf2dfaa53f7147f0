/// Phrases that turn a chat message into an image request.
pub(crate) const IMAGE_INTENT_KEYWORDS: &[&str] = &[
    "generate image",
    "create image",
    "make an image",
    "draw a",
    "paint a",
    "generate a picture",
    "create a picture",
    "make a picture",
    "generate photo",
    "create photo",
    "make a photo",
    "image of",
    "picture of",
    "create a portrait",
    "generate a portrait",
    "draw a portrait",
    "create a landscape",
    "generate a landscape",
    "draw a landscape",
];

/// Words that mean the user already asked for a look; suppresses the
/// photorealistic default.
pub(crate) const STYLE_KEYWORDS: &[&str] = &[
    "realistic",
    "photorealistic",
    "photo",
    "photography",
    "cartoon",
    "anime",
    "sketch",
    "painting",
];

pub(crate) const DRESS_CHANGE_KEYWORDS: &[&str] =
    &["dress", "wear", "outfit", "uniform", "costume"];

pub(crate) const BACKGROUND_CHANGE_KEYWORDS: &[&str] = &[
    "background",
    "location",
    "place",
    "standing at",
    "sitting at",
];

pub(crate) const MERGE_KEYWORDS: &[&str] = &["add me", "add my character"];
