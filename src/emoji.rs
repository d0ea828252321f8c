//! Emoji-shortcode rendering for message bodies (`:shortcode:` → unicode glyph)

/*
 *   Mattermost Push Proxy
 *
 *   This program is free software: you can redistribute it and/or modify
 *   it under the terms of the GNU Affero General Public License as
 *   published by the Free Software Foundation, either version 3 of the
 *   License, or (at your option) any later version.
 *
 *   This program is distributed in the hope that it will be useful,
 *   but WITHOUT ANY WARRANTY; without even the implied warranty of
 *   MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 *   GNU Affero General Public License for more details.
 *
 *   You should have received a copy of the GNU Affero General Public License
 *   along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::sync::OnceLock;

use regex::Regex;

fn shortcode_pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	PATTERN.get_or_init(|| Regex::new(r":([a-zA-Z0-9_+\-]+):").expect("static pattern is valid"))
}

/// Replace every `:shortcode:` occurrence in `text` with the matching emoji
/// glyph. Unknown shortcodes are left untouched, including their colons.
#[must_use]
pub fn render(text: &str) -> String {
	shortcode_pattern()
		.replace_all(text, |captures: &regex::Captures<'_>| {
			let shortcode = &captures[1];
			emojis::get_by_shortcode(shortcode)
				.map(emojis::Emoji::as_str)
				.unwrap_or(&captures[0])
				.to_owned()
		})
		.into_owned()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn known_shortcode_is_replaced() {
		assert_eq!(render("hello :+1: world"), "hello 👍 world");
	}

	#[test]
	fn unknown_shortcode_is_left_alone() {
		assert_eq!(render("hello :not_a_real_emoji: world"), "hello :not_a_real_emoji: world");
	}

	#[test]
	fn text_without_shortcodes_is_unchanged() {
		assert_eq!(render("just plain text"), "just plain text");
	}
}
