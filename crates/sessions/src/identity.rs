/// A resolved identity: one level of the session/channel/global cascade, or
/// the merged result of it. `None` fields fall through to the next level
/// down; a field present here always wins over a lower level.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IdentityContext {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub system_prompt_prefix: Option<String>,
}

impl IdentityContext {
    /// Overlays `self` on top of `lower` — fields `self` sets win, `None`
    /// fields fall through to `lower`. Used to cascade
    /// session override → channel default → global default.
    fn overlay(self, lower: &IdentityContext) -> IdentityContext {
        IdentityContext {
            name: self.name.or_else(|| lower.name.clone()),
            avatar: self.avatar.or_else(|| lower.avatar.clone()),
            bio: self.bio.or_else(|| lower.bio.clone()),
            system_prompt_prefix: self
                .system_prompt_prefix
                .or_else(|| lower.system_prompt_prefix.clone()),
        }
    }
}

/// Resolves the 3-level identity cascade: a per-session override, a
/// per-channel default, and a global default. Each level is a complete,
/// independently-stored record; resolution merges them field-by-field,
/// session taking precedence over channel, channel over global.
///
/// Updates are never partial merges into a stored record — a caller who
/// wants to change one field must resend the whole level's record, and
/// this registry replaces it outright (no stored record is ever mutated
/// in place).
pub struct IdentityResolver {
    global_default: IdentityContext,
    channel_defaults: parking_lot::RwLock<std::collections::HashMap<String, IdentityContext>>,
    session_overrides: parking_lot::RwLock<std::collections::HashMap<String, IdentityContext>>,
}

impl IdentityResolver {
    pub fn new(global_default: IdentityContext) -> Self {
        Self {
            global_default,
            channel_defaults: parking_lot::RwLock::new(std::collections::HashMap::new()),
            session_overrides: parking_lot::RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub fn set_channel_default(&self, channel_id: &str, identity: IdentityContext) {
        self.channel_defaults
            .write()
            .insert(channel_id.to_string(), identity);
    }

    pub fn set_session_override(&self, node_id: &str, identity: IdentityContext) {
        self.session_overrides
            .write()
            .insert(node_id.to_string(), identity);
    }

    pub fn clear_session_override(&self, node_id: &str) {
        self.session_overrides.write().remove(node_id);
    }

    pub fn resolve(&self, node_id: &str, channel_id: &str) -> IdentityContext {
        let session = self
            .session_overrides
            .read()
            .get(node_id)
            .cloned()
            .unwrap_or_default();
        let channel = self
            .channel_defaults
            .read()
            .get(channel_id)
            .cloned()
            .unwrap_or_default();

        session.overlay(&channel).overlay(&self.global_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_through_to_global_when_nothing_overridden() {
        let resolver = IdentityResolver::new(IdentityContext {
            name: Some("Global Bot".into()),
            ..Default::default()
        });
        let resolved = resolver.resolve("n1", "whatsapp");
        assert_eq!(resolved.name, Some("Global Bot".into()));
    }

    #[test]
    fn channel_default_overrides_global() {
        let resolver = IdentityResolver::new(IdentityContext {
            name: Some("Global Bot".into()),
            ..Default::default()
        });
        resolver.set_channel_default(
            "whatsapp",
            IdentityContext {
                name: Some("WhatsApp Bot".into()),
                ..Default::default()
            },
        );
        assert_eq!(resolver.resolve("n1", "whatsapp").name, Some("WhatsApp Bot".into()));
        assert_eq!(resolver.resolve("n1", "telegram").name, Some("Global Bot".into()));
    }

    #[test]
    fn session_override_wins_over_channel_and_global() {
        let resolver = IdentityResolver::new(IdentityContext {
            name: Some("Global Bot".into()),
            bio: Some("global bio".into()),
            ..Default::default()
        });
        resolver.set_channel_default(
            "whatsapp",
            IdentityContext {
                name: Some("WhatsApp Bot".into()),
                ..Default::default()
            },
        );
        resolver.set_session_override(
            "n1",
            IdentityContext {
                name: Some("Custom Name".into()),
                ..Default::default()
            },
        );

        let resolved = resolver.resolve("n1", "whatsapp");
        assert_eq!(resolved.name, Some("Custom Name".into()));
        assert_eq!(resolved.bio, Some("global bio".into()));
    }

    #[test]
    fn clearing_override_falls_back_through_cascade() {
        let resolver = IdentityResolver::new(IdentityContext::default());
        resolver.set_session_override(
            "n1",
            IdentityContext {
                name: Some("Custom".into()),
                ..Default::default()
            },
        );
        resolver.clear_session_override("n1");
        assert_eq!(resolver.resolve("n1", "whatsapp").name, None);
    }
}
