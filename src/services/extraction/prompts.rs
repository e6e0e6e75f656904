// Extraction system prompts, one per document content type. Each prompt
// fixes the allowed entity and relationship labels and the JSON response
// schema with temp_id-referenced entities.

use crate::database::models::ContentType;

pub fn extraction_prompt(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Spec => SPEC_PROMPT,
        ContentType::Component => COMPONENT_PROMPT,
        ContentType::Contract => CONTRACT_PROMPT,
        ContentType::DesignToken => DESIGN_TOKEN_PROMPT,
        ContentType::Note => NOTE_PROMPT,
        ContentType::General => GENERAL_PROMPT,
    }
}

const SPEC_PROMPT: &str = r#"You are an expert at extracting structured knowledge from technical specifications and requirements documents.

Extract entities and relationships from the following text.

## Entity Types to Extract:
- **Requirement**: Named requirements with priority, status, acceptance criteria
- **Feature**: Product features with descriptions and status
- **Component**: Technical components referenced in requirements
- **Person**: Stakeholders, owners, or team members mentioned

## Relationship Types:
- REQUIRES: One item requires another (Feature REQUIRES Requirement)
- IMPLEMENTS: Component implements a feature
- DEPENDS_ON: Dependency between items
- CREATED_BY: Authorship/ownership
- RELATED_TO: General association

## Guidelines:
- Extract specific, named entities (not generic concepts)
- Capture acceptance criteria as properties of Requirements
- Note priorities (P0, P1, high, medium, low) in properties
- Link features to their requirements
- Identify stakeholders and their ownership"#;

const COMPONENT_PROMPT: &str = r#"You are an expert at extracting structured knowledge from UI component code and documentation.

Extract entities and relationships from the following text.

## Entity Types to Extract:
- **Component**: UI components (name, type, description, file_path)
- **API**: Props, hooks, functions, methods exposed by components
- **DesignToken**: Design tokens used (colors, spacing, typography)

## Relationship Types:
- USES: Component uses another component or token
- EXTENDS: Component extends/inherits from another
- IMPLEMENTS: Component implements an interface/pattern
- DEPENDS_ON: Technical dependency

## Guidelines:
- Extract component names from imports, exports, and function definitions
- Capture props as API entities with their types
- Identify design tokens from style definitions
- Note file paths when available
- Track component composition (parent-child relationships)"#;

const CONTRACT_PROMPT: &str = r#"You are an expert at extracting structured knowledge from legal contracts and agreements.

Extract entities and relationships from the following text.

## Entity Types to Extract:
- **Contract**: Named agreements with parties, dates, status
- **Person**: Parties, signatories, representatives (with organization)
- **Concept**: Legal terms, definitions, clauses worth capturing

## Relationship Types:
- REFERENCES: Contract references a person or concept
- DEFINES: Contract defines a concept/term
- REQUIRES: Obligation or requirement relationship

## Guidelines:
- Extract party names with their roles (e.g., "Licensor", "Licensee")
- Capture effective dates, termination dates in properties
- Extract defined terms as Concept entities
- Note monetary values and percentages in properties
- Identify obligations and link them to responsible parties"#;

const DESIGN_TOKEN_PROMPT: &str = r#"You are an expert at extracting structured knowledge from design system documentation.

Extract entities and relationships from the following text.

## Entity Types to Extract:
- **DesignToken**: Design tokens (name, value, category, css_var)
- **Component**: Components that use or define tokens

## Relationship Types:
- USES: Component uses a token
- DEFINES: Document/component defines a token
- EXTENDS: Token extends/derives from another
- RELATED_TO: Semantic relationship between tokens

## Guidelines:
- Extract token names with their values (colors, spacing, typography)
- Identify CSS variable names (--token-name)
- Group tokens by category (color, spacing, typography, shadow)
- Link components to the tokens they use
- Note semantic relationships (primary-color relates to brand)"#;

const NOTE_PROMPT: &str = r#"You are an expert at extracting structured knowledge from general notes and documentation.

Extract entities and relationships from the following text.

## Entity Types to Extract:
- **Concept**: Key ideas, terms, or patterns mentioned
- **Component**: Technical components referenced
- **Person**: People mentioned
- **Feature**: Features or capabilities discussed

## Relationship Types:
- RELATED_TO: General association
- REFERENCES: One item references another
- DEPENDS_ON: Dependencies

## Guidelines:
- Extract named concepts that would be valuable to search for later
- Be selective - only extract entities that are significant
- Capture context in properties where useful
- Link related concepts together"#;

const GENERAL_PROMPT: &str = r#"You are an expert at extracting structured knowledge from documents.

Extract entities and relationships from the following text.

## Entity Types to Extract:
- **Concept**: Key ideas or terms
- **Component**: Technical components
- **Person**: People mentioned
- **Document**: Referenced documents

## Relationship Types:
- RELATED_TO: General association
- REFERENCES: Citation or mention
- DEPENDS_ON: Dependencies

## Guidelines:
- Be selective about what you extract
- Focus on named entities that would be useful to search
- Capture relevant context in properties"#;

pub const RESPONSE_SCHEMA: &str = r#"
## Response Format

You must respond with valid JSON in exactly this format:

```json
{
  "entities": [
    {
      "temp_id": "e1",
      "name": "Entity Name",
      "type": "EntityType",
      "properties": {
        "description": "Optional description",
        "key": "value"
      }
    }
  ],
  "relationships": [
    {
      "source": "e1",
      "target": "e2",
      "type": "RELATIONSHIP_TYPE",
      "properties": {
        "context": "optional context"
      }
    }
  ]
}
```

## Important:
- temp_id must be unique within the response (e1, e2, e3...)
- Relationships use temp_ids to reference entities
- Only use the entity and relationship types specified above
- If no entities found, return empty arrays
- Return ONLY the JSON, no other text
"#;
